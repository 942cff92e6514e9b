use crate::error::{CalcError, Result};
use crate::store::StoreClient;

/// Rebuild a store URL from the callback path a client polls with.
///
/// Accepts the callback URL as issued (`http://host/...`), the form left after
/// path normalisation collapses `//` (`http:/host/...`), or a bare
/// `host/...` path. Bare paths are read over plain http.
pub fn callback_url(path: &str) -> Option<String> {
    let path = path.trim_start_matches('/');
    let (scheme, rest) = ["https", "http"]
        .into_iter()
        .find_map(|scheme| {
            path.strip_prefix(scheme)
                .and_then(|r| r.strip_prefix(':'))
                .map(|r| (scheme, r.trim_start_matches('/')))
        })
        .unwrap_or(("http", path));

    if rest.is_empty() {
        return None;
    }
    Some(format!("{}://{}", scheme, rest))
}

/// Proxies status polling to the store. Never writes.
#[derive(Debug, Clone)]
pub struct StatusRelay {
    store: StoreClient,
}

impl StatusRelay {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Raw status record behind `callback_path`.
    pub async fn get_status(&self, callback_path: &str) -> Result<Vec<u8>> {
        let url = callback_url(callback_path).ok_or_else(|| CalcError::StatusRead {
            url: callback_path.to_string(),
            reason: "empty callback path".to_string(),
        })?;

        self.store
            .get_record(&url)
            .await
            .map_err(|e| CalcError::StatusRead {
                url,
                reason: e.to_string(),
            })
    }
}
