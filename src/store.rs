//! Client for the remote DVID store.
//!
//! The store is treated as a plain HTTP object store: blobs are read with GET,
//! key/value records are written with POST. No call is retried here; request
//! timeouts come from the underlying [`reqwest::Client`].

use serde_json::Value;

use crate::config::StoreConfig;
use crate::error::{CalcError, Result, StoreError};

/// Path on the discovery proxy that describes the store node.
const DISCOVERY_PATH: &str = "/services/dvid/node";

/// Prefix `http://` unless the location already names a scheme.
pub fn with_scheme(location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        location.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", location.trim_end_matches('/'))
    }
}

/// URL of a dataset node: `<base>/api/node/<uuid>`.
pub fn node_url(base: &str, uuid: &str) -> String {
    format!("{}/api/node/{}", base, uuid)
}

#[derive(Debug, Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    discovery_proxy: Option<String>,
}

impl StoreClient {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CalcError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            discovery_proxy: config.discovery_proxy.clone(),
        })
    }

    /// Base URL of the store, with scheme and without trailing slash.
    ///
    /// An explicit location always wins; otherwise the discovery proxy is
    /// asked for the store's `service-location`.
    pub async fn resolve_location(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(location) = explicit.filter(|l| !l.trim().is_empty()) {
            return Ok(with_scheme(location.trim()));
        }

        let Some(proxy) = &self.discovery_proxy else {
            return Err(CalcError::StoreResolution(
                "no dvid-server given and no proxy configured".to_string(),
            ));
        };

        let url = format!("{}{}", with_scheme(proxy), DISCOVERY_PATH);
        let body = self
            .get_bytes(&url)
            .await
            .map_err(|e| CalcError::StoreResolution(format!("proxy lookup failed: {}", e)))?;

        let node: Value = serde_json::from_slice(&body).map_err(|e| {
            CalcError::StoreResolution(format!("proxy reply from {} is not JSON: {}", url, e))
        })?;
        match node.get("service-location").and_then(Value::as_str) {
            Some(location) if !location.is_empty() => {
                tracing::debug!(proxy = %proxy, location, "Resolved store through proxy");
                Ok(with_scheme(location))
            }
            _ => Err(CalcError::StoreResolution(format!(
                "no service-location in proxy reply from {}",
                url
            ))),
        }
    }

    /// GET a blob. Anything but a 2xx answer is a failure.
    pub async fn fetch_blob(&self, url: &str) -> std::result::Result<Vec<u8>, StoreError> {
        self.get_bytes(url).await
    }

    /// Declare a key/value collection on a dataset.
    ///
    /// The store answers with an error status when the collection already
    /// exists, so any HTTP answer counts as success. Only transport failures
    /// are reported.
    pub async fn create_keyvalue_collection(
        &self,
        base: &str,
        uuid: &str,
        name: &str,
    ) -> std::result::Result<(), StoreError> {
        let url = format!("{}/api/repo/{}/instance", base, uuid);
        let payload = serde_json::json!({ "typename": "keyvalue", "dataname": name });
        let resp = self.http.post(&url).json(&payload).send().await?;
        if !resp.status().is_success() {
            tracing::debug!(
                url = %url,
                status = resp.status().as_u16(),
                "Collection creation refused, assuming it exists"
            );
        }
        Ok(())
    }

    /// POST a JSON record to a key URL.
    pub async fn put_record(
        &self,
        url: &str,
        payload: &Value,
    ) -> std::result::Result<(), StoreError> {
        let resp = self.http.post(url).json(payload).send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    /// GET a key/value record without triggering interactive store behaviour.
    pub async fn get_record(&self, url: &str) -> std::result::Result<Vec<u8>, StoreError> {
        let resp = self
            .http
            .get(url)
            .query(&[("interactive", "false")])
            .send()
            .await?;
        Self::body_of(url, resp).await
    }

    async fn get_bytes(&self, url: &str) -> std::result::Result<Vec<u8>, StoreError> {
        let resp = self.http.get(url).send().await?;
        Self::body_of(url, resp).await
    }

    async fn body_of(
        url: &str,
        resp: reqwest::Response,
    ) -> std::result::Result<Vec<u8>, StoreError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
