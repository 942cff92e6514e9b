use std::sync::Arc;

use serde_json::Value;

use crate::config::ServiceConfig;
use crate::dispatcher::{JobConfig, JobDispatcher};
use crate::error::Result;
use crate::launcher::{self, JobLauncher};
use crate::relay::StatusRelay;
use crate::schema::validate;
use crate::session::SessionManager;
use crate::stager::ArtifactStager;
use crate::store::StoreClient;

/// Submission pipeline: validate, resolve the store, allocate a session,
/// stage artifacts, dispatch.
#[derive(Debug, Clone)]
pub struct CalcService {
    store: StoreClient,
    sessions: SessionManager,
    stager: ArtifactStager,
    dispatcher: JobDispatcher,
    relay: StatusRelay,
}

impl CalcService {
    /// Build the service with the launcher named by the configuration.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let launcher = launcher::from_config(&config.launch);
        Self::with_launcher(config, launcher)
    }

    pub fn with_launcher(config: ServiceConfig, launcher: Arc<dyn JobLauncher>) -> Result<Self> {
        let store = StoreClient::new(&config.store)?;
        Ok(Self {
            sessions: SessionManager::new(config.staging_root.clone()),
            stager: ArtifactStager::new(store.clone()),
            dispatcher: JobDispatcher::new(store.clone(), launcher),
            relay: StatusRelay::new(store.clone()),
            store,
        })
    }

    /// Accept a request document and launch its job. Returns the
    /// result-callback URL.
    pub async fn submit(&self, doc: &Value) -> Result<String> {
        let request = validate(doc)?;
        let base = self
            .store
            .resolve_location(request.dvid_server.as_deref())
            .await?;

        let session = self.sessions.create().await?;
        tracing::info!(
            session_id = %session.id,
            uuid = %request.uuid,
            algorithm = %request.algorithm,
            store = %base,
            "Accepted label calculation"
        );

        if request.algorithm.requires_artifacts() {
            let staged = self.stager.stage(&base, &request, &session).await?;
            tracing::debug!(session_id = %session.id, artifacts = staged.len(), "Staging complete");
        }

        let job = JobConfig::new(&base, &session, request);
        self.dispatcher.dispatch(&job, &session).await
    }

    /// Raw status record for a previously issued callback.
    pub async fn status(&self, callback_path: &str) -> Result<Vec<u8>> {
        self.relay.get_status(callback_path).await
    }

    /// Store location for display purposes; `None` when it cannot be found.
    pub async fn default_store_location(&self) -> Option<String> {
        self.store.resolve_location(None).await.ok()
    }
}
