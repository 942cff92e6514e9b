use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{CalcError, Result};

/// Form fields copied to the request under the same name.
const TEXT_FIELDS: [&str; 8] = [
    "uuid",
    "algorithm",
    "roi",
    "synapses",
    "classifier",
    "agglomclassifier",
    "agglomfeaturefile",
    "graphclassifier",
];

/// Integer form fields and the request field each one fills.
const INTEGER_FIELDS: [(&str, &str); 4] = [
    ("jobsize", "job-size"),
    ("seedsize", "seed-size"),
    ("stitchmode", "stitch-mode"),
    ("overlapsize", "overlap-size"),
];

/// Translate the bundled form into a request document for the validator.
///
/// Blank fields are left out so that schema defaults apply. Coordinates are
/// entered as `"x,y,z"`.
pub fn form_to_request(fields: &HashMap<String, String>) -> Result<Value> {
    let value_of = |name: &str| {
        fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let mut doc = Map::new();

    if let Some(server) = value_of("dvidserver") {
        doc.insert("dvid-server".into(), Value::from(server));
    }
    if let Some(label) = value_of("labelname") {
        doc.insert("label-name".into(), Value::from(label));
    }
    for name in TEXT_FIELDS {
        if let Some(v) = value_of(name) {
            doc.insert(name.into(), Value::from(v));
        }
    }

    for name in ["bbox1", "bbox2"] {
        if let Some(raw) = value_of(name) {
            doc.insert(name.into(), parse_coordinate(name, raw)?);
        }
    }

    for (form_name, field) in INTEGER_FIELDS {
        if let Some(raw) = value_of(form_name) {
            let n: i64 = raw.parse().map_err(|_| {
                CalcError::Validation(format!("`{}` must be an integer, got {:?}", field, raw))
            })?;
            doc.insert(field.into(), Value::from(n));
        }
    }

    if let Some(raw) = value_of("agglomthreshold") {
        let n: f64 = raw.parse().map_err(|_| {
            CalcError::Validation(format!("`agglom-threshold` must be a number, got {:?}", raw))
        })?;
        doc.insert("agglom-threshold".into(), Value::from(n));
    }

    Ok(Value::Object(doc))
}

fn parse_coordinate(name: &str, raw: &str) -> Result<Value> {
    raw.split(',')
        .map(|part| {
            part.trim().parse::<i64>().map(Value::from).map_err(|_| {
                CalcError::Validation(format!(
                    "`{}` must be three comma-separated integers, got {:?}",
                    name, raw
                ))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}
