//! Request schema for label calculations.
//!
//! [`validate`] turns an arbitrary decoded JSON document into a
//! [`SubmissionRequest`] with every default applied. It performs no I/O, so a
//! rejected request never leaves anything behind on disk or in the store.
//!
//! Canonical schema:
//!
//! | field | type | required | default |
//! |---|---|---|---|
//! | `dvid-server` | string | no | discovered through the proxy |
//! | `uuid` | string | yes | |
//! | `label-name` | string | yes | |
//! | `algorithm` | `"segment"` \| `"compute-graph"` | yes | |
//! | `bbox1`, `bbox2` | 3 integers each | together, or `roi` | |
//! | `roi` | string | see above | `""` |
//! | `job-size` | positive integer | no | 500 |
//! | `overlap-size` | integer >= 0 | no | 40 |
//! | `seed-size` | integer >= 0 | no | 5 |
//! | `stitch-mode` | integer | no | 0 |
//! | `agglom-threshold` | number | no | 0.2 |
//! | `classifier`, `agglomclassifier`, `agglomfeaturefile`, `graphclassifier`, `synapses` | string | no | `""` |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CalcError, Result};

pub const DEFAULT_JOB_SIZE: u32 = 500;
pub const DEFAULT_OVERLAP_SIZE: u32 = 40;
pub const DEFAULT_SEED_SIZE: u32 = 5;
pub const DEFAULT_STITCH_MODE: i64 = 0;
pub const DEFAULT_AGGLOM_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Full segmentation; needs classifiers staged from the store.
    Segment,
    /// Graph computation over an existing label volume.
    ComputeGraph,
}

impl Algorithm {
    pub const ALL: [Algorithm; 2] = [Algorithm::Segment, Algorithm::ComputeGraph];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Segment => "segment",
            Algorithm::ComputeGraph => "compute-graph",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == value)
    }

    /// Whether artifacts must be staged before launch.
    pub fn requires_artifacts(&self) -> bool {
        matches!(self, Algorithm::Segment)
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request that passed validation, with every default resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubmissionRequest {
    /// Store location as supplied by the caller. The resolved location is
    /// written to the job config separately.
    #[serde(skip)]
    pub dvid_server: Option<String>,
    pub uuid: String,
    pub label_name: String,
    pub algorithm: Algorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox1: Option<[i64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox2: Option<[i64; 3]>,
    #[serde(default)]
    pub roi: String,
    pub job_size: u32,
    pub overlap_size: u32,
    pub seed_size: u32,
    pub stitch_mode: i64,
    pub agglom_threshold: f64,
    #[serde(default)]
    pub classifier: String,
    #[serde(default)]
    pub agglomclassifier: String,
    #[serde(default)]
    pub agglomfeaturefile: String,
    #[serde(default)]
    pub graphclassifier: String,
    #[serde(default)]
    pub synapses: String,
}

/// Validate a decoded request document.
pub fn validate(doc: &Value) -> Result<SubmissionRequest> {
    let obj = doc
        .as_object()
        .ok_or_else(|| invalid("request must be a JSON object"))?;

    let uuid = required_string(obj, "uuid")?;
    check_path_segment("uuid", &uuid)?;
    let label_name = required_string(obj, "label-name")?;
    let algorithm_name = required_string(obj, "algorithm")?;
    let algorithm = Algorithm::parse(&algorithm_name).ok_or_else(|| {
        let allowed: Vec<&str> = Algorithm::ALL.iter().map(|a| a.as_str()).collect();
        invalid(format!(
            "`algorithm` must be one of {:?}, got {:?}",
            allowed, algorithm_name
        ))
    })?;

    let bbox1 = coordinate(obj, "bbox1")?;
    let bbox2 = coordinate(obj, "bbox2")?;
    let roi = optional_string(obj, "roi")?;
    match (&bbox1, &bbox2) {
        (Some(_), Some(_)) => {}
        (None, None) if !roi.is_empty() => {}
        (None, None) => {
            return Err(invalid(
                "a region is required: supply `bbox1` and `bbox2` or a non-empty `roi`",
            ))
        }
        _ => return Err(invalid("`bbox1` and `bbox2` must be supplied together")),
    }

    let job_size = unsigned(obj, "job-size", DEFAULT_JOB_SIZE)?;
    if job_size == 0 {
        return Err(invalid("`job-size` must be a positive integer"));
    }

    Ok(SubmissionRequest {
        dvid_server: Some(optional_string(obj, "dvid-server")?).filter(|s| !s.is_empty()),
        uuid,
        label_name,
        algorithm,
        bbox1,
        bbox2,
        roi,
        job_size,
        overlap_size: unsigned(obj, "overlap-size", DEFAULT_OVERLAP_SIZE)?,
        seed_size: unsigned(obj, "seed-size", DEFAULT_SEED_SIZE)?,
        stitch_mode: integer(obj, "stitch-mode", DEFAULT_STITCH_MODE)?,
        agglom_threshold: number(obj, "agglom-threshold", DEFAULT_AGGLOM_THRESHOLD)?,
        classifier: optional_string(obj, "classifier")?,
        agglomclassifier: optional_string(obj, "agglomclassifier")?,
        agglomfeaturefile: optional_string(obj, "agglomfeaturefile")?,
        graphclassifier: optional_string(obj, "graphclassifier")?,
        synapses: optional_string(obj, "synapses")?,
    })
}

fn invalid(msg: impl Into<String>) -> CalcError {
    CalcError::Validation(msg.into())
}

/// Absent and `null` fields are treated the same.
fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn required_string(obj: &Map<String, Value>, key: &str) -> Result<String> {
    match field(obj, key) {
        None => Err(invalid(format!("`{}` is required", key))),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(invalid(format!("`{}` must not be empty", key)))
        }
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(invalid(format!("`{}` must be a string", key))),
    }
}

/// `uuid` becomes a single segment of every store URL.
fn check_path_segment(key: &str, value: &str) -> Result<()> {
    if value.contains(&['/', '\\', '?', '#', '%'][..]) || value.contains("..") {
        return Err(invalid(format!(
            "`{}` must not contain path separators, `..`, `?`, `#` or `%`, got {:?}",
            key, value
        )));
    }
    Ok(())
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Result<String> {
    match field(obj, key) {
        None => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(invalid(format!("`{}` must be a string", key))),
    }
}

fn coordinate(obj: &Map<String, Value>, key: &str) -> Result<Option<[i64; 3]>> {
    let Some(value) = field(obj, key) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .filter(|items| items.len() == 3)
        .ok_or_else(|| invalid(format!("`{}` must be an array of exactly 3 integers", key)))?;

    let mut coord = [0i64; 3];
    for (slot, item) in coord.iter_mut().zip(items) {
        *slot = item
            .as_i64()
            .ok_or_else(|| invalid(format!("`{}` must contain only integers", key)))?;
    }
    Ok(Some(coord))
}

fn unsigned(obj: &Map<String, Value>, key: &str, default: u32) -> Result<u32> {
    match field(obj, key) {
        None => Ok(default),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| invalid(format!("`{}` must be a non-negative integer", key))),
    }
}

fn integer(obj: &Map<String, Value>, key: &str, default: i64) -> Result<i64> {
    match field(obj, key) {
        None => Ok(default),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| invalid(format!("`{}` must be an integer", key))),
    }
}

fn number(obj: &Map<String, Value>, key: &str, default: f64) -> Result<f64> {
    match field(obj, key) {
        None => Ok(default),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| invalid(format!("`{}` must be a number", key))),
    }
}
