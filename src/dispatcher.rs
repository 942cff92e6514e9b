use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CalcError, Result};
use crate::launcher::JobLauncher;
use crate::schema::SubmissionRequest;
use crate::session::Session;
use crate::store::{node_url, StoreClient};

/// Key/value collection holding one status record per session.
pub const STATUS_COLLECTION: &str = "clusterjobstatus";

/// File in the session directory read by the compute program.
pub const CONFIG_FILE: &str = "config.json";

/// Status written before the compute program takes over the record.
pub const INITIAL_STATUS: &str = "not started";

/// Everything the compute program needs, persisted as `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Resolved store location, with scheme.
    #[serde(rename = "dvid-server")]
    pub dvid_server: String,
    #[serde(rename = "session-id")]
    pub session_id: String,
    #[serde(rename = "result-callback")]
    pub result_callback: String,
    #[serde(flatten)]
    pub request: SubmissionRequest,
}

impl JobConfig {
    pub fn new(base: &str, session: &Session, request: SubmissionRequest) -> Self {
        Self {
            dvid_server: base.to_string(),
            session_id: session.id.clone(),
            result_callback: status_url(base, &request.uuid, &session.id),
            request,
        }
    }
}

/// `<base>/api/node/<uuid>/clusterjobstatus/key/<session-id>`
pub fn status_url(base: &str, uuid: &str, session_id: &str) -> String {
    format!(
        "{}/{}/key/{}",
        node_url(base, uuid),
        STATUS_COLLECTION,
        session_id
    )
}

/// Persists the job config, registers the status record and launches the
/// compute program.
#[derive(Debug, Clone)]
pub struct JobDispatcher {
    store: StoreClient,
    launcher: Arc<dyn JobLauncher>,
}

impl JobDispatcher {
    pub fn new(store: StoreClient, launcher: Arc<dyn JobLauncher>) -> Self {
        Self { store, launcher }
    }

    /// Dispatch a staged session. Returns the result-callback URL once the
    /// program has been started.
    pub async fn dispatch(&self, config: &JobConfig, session: &Session) -> Result<String> {
        self.store
            .create_keyvalue_collection(
                &config.dvid_server,
                &config.request.uuid,
                STATUS_COLLECTION,
            )
            .await
            .map_err(|e| {
                CalcError::Dispatch(format!(
                    "status collection could not be created on {}: {}",
                    config.dvid_server, e
                ))
            })?;

        self.store
            .put_record(&config.result_callback, &json!({ "status": INITIAL_STATUS }))
            .await
            .map_err(|e| {
                CalcError::Dispatch(format!(
                    "status could not be written to {}: {}",
                    config.result_callback, e
                ))
            })?;

        write_config(config, session).await?;

        self.launcher.launch(&session.dir)?;

        tracing::info!(
            session_id = %session.id,
            algorithm = %config.request.algorithm,
            callback = %config.result_callback,
            "Dispatched label calculation"
        );
        Ok(config.result_callback.clone())
    }
}

async fn write_config(config: &JobConfig, session: &Session) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(config)
        .map_err(|e| CalcError::Dispatch(format!("cannot encode job config: {}", e)))?;
    let path = session.file(CONFIG_FILE);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| CalcError::Dispatch(format!("cannot write {}: {}", path.display(), e)))
}
