use crate::error::{CalcError, Result};
use crate::schema::SubmissionRequest;
use crate::session::Session;
use crate::store::{node_url, StoreClient};

const CLASSIFIER_PATH: &str = "classifiers/key/";
const ANNOTATIONS_PATH: &str = "annotations/";

/// Role an input blob plays for the compute program. Each role has a fixed
/// filename in the session directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRole {
    Classifier,
    AgglomClassifier,
    AgglomFeatures,
    GraphClassifier,
    Synapses,
}

impl ArtifactRole {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactRole::Classifier => "classifier.ilp",
            ArtifactRole::AgglomClassifier => "agglomclassifier.xml",
            ArtifactRole::AgglomFeatures => "agglomfeatures.txt",
            ArtifactRole::GraphClassifier => "graphclassifier.h5",
            ArtifactRole::Synapses => "synapses.json",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ArtifactRole::Classifier => "Classifier",
            ArtifactRole::AgglomClassifier => "Agglomeration classifier",
            ArtifactRole::AgglomFeatures => "Classifier features",
            ArtifactRole::GraphClassifier => "Graph classifier",
            ArtifactRole::Synapses => "Synapses",
        }
    }

    fn collection_path(&self) -> &'static str {
        match self {
            ArtifactRole::Synapses => ANNOTATIONS_PATH,
            _ => CLASSIFIER_PATH,
        }
    }

    fn required(&self) -> bool {
        matches!(
            self,
            ArtifactRole::Classifier | ArtifactRole::AgglomClassifier
        )
    }
}

/// Artifact a request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef<'a> {
    pub role: ArtifactRole,
    pub name: &'a str,
}

/// Artifacts a request needs, in staging order. Optional artifacts with an
/// empty name are left out; required ones are always listed.
pub fn planned_artifacts(req: &SubmissionRequest) -> Vec<ArtifactRef<'_>> {
    if !req.algorithm.requires_artifacts() {
        return Vec::new();
    }
    [
        (ArtifactRole::Classifier, req.classifier.as_str()),
        (ArtifactRole::AgglomClassifier, req.agglomclassifier.as_str()),
        (ArtifactRole::AgglomFeatures, req.agglomfeaturefile.as_str()),
        (ArtifactRole::GraphClassifier, req.graphclassifier.as_str()),
        (ArtifactRole::Synapses, req.synapses.as_str()),
    ]
    .into_iter()
    .filter(|(role, name)| role.required() || !name.is_empty())
    .map(|(role, name)| ArtifactRef { role, name })
    .collect()
}

/// Store URL of an artifact, with its name encoded as a single path segment.
fn artifact_url(
    node: &str,
    artifact: &ArtifactRef<'_>,
    req: &SubmissionRequest,
) -> Result<String> {
    let role = artifact.role;
    let reject = |reason: String| CalcError::Staging {
        artifact: role.label(),
        url: format!("{}/{}", node, role.collection_path()),
        reason,
    };

    match artifact.name {
        "" => {
            return Err(reject(format!(
                "a name is required for algorithm {}",
                req.algorithm
            )))
        }
        "." | ".." => return Err(reject(format!("{:?} is not a valid name", artifact.name))),
        _ => {}
    }

    let mut url = reqwest::Url::parse(node).map_err(|e| reject(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| reject("store URL cannot take a path".to_string()))?
        .extend(role.collection_path().split('/').filter(|s| !s.is_empty()))
        .push(artifact.name);
    Ok(url.to_string())
}

/// Copies the artifacts a request needs from the store into its session.
#[derive(Debug, Clone)]
pub struct ArtifactStager {
    store: StoreClient,
}

impl ArtifactStager {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Stage every planned artifact. Returns the roles that were written.
    ///
    /// The first failure aborts staging; files written before it stay in the
    /// session directory.
    pub async fn stage(
        &self,
        base: &str,
        req: &SubmissionRequest,
        session: &Session,
    ) -> Result<Vec<ArtifactRole>> {
        let plan = planned_artifacts(req);
        let node = node_url(base, &req.uuid);

        // Every name is checked before touching the store.
        let urls = plan
            .iter()
            .map(|artifact| artifact_url(&node, artifact, req))
            .collect::<Result<Vec<_>>>()?;

        let mut staged = Vec::with_capacity(plan.len());
        for (artifact, url) in plan.into_iter().zip(urls) {
            let bytes = self
                .store
                .fetch_blob(&url)
                .await
                .map_err(|e| CalcError::Staging {
                    artifact: artifact.role.label(),
                    url: url.clone(),
                    reason: e.to_string(),
                })?;

            let path = session.file(artifact.role.file_name());
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| CalcError::Staging {
                    artifact: artifact.role.label(),
                    url: url.clone(),
                    reason: format!("cannot write {}: {}", path.display(), e),
                })?;

            tracing::debug!(
                session_id = %session.id,
                artifact = artifact.role.file_name(),
                bytes = bytes.len(),
                url = %url,
                "Staged artifact"
            );
            staged.push(artifact.role);
        }

        Ok(staged)
    }
}
