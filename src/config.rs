use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CalcError, Result};

/// Program invoked with the session directory as its only argument.
pub const DEFAULT_PROGRAM: &str = "calclabels";

/// Default HTTP port of the service.
pub const DEFAULT_PORT: u16 = 25125;

/// How the external compute program is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchConfig {
    /// Spawn the program as a child of this process.
    Local { program: String },
    /// Run the program over ssh on another host, exporting `env` first.
    Remote {
        program: String,
        host: String,
        user: Option<String>,
        /// `NAME=VALUE` assignments, exported in order.
        env: Vec<String>,
    },
}

impl Default for LaunchConfig {
    fn default() -> Self {
        LaunchConfig::Local {
            program: DEFAULT_PROGRAM.to_string(),
        }
    }
}

impl LaunchConfig {
    pub fn program(&self) -> &str {
        match self {
            LaunchConfig::Local { program } | LaunchConfig::Remote { program, .. } => program,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, LaunchConfig::Remote { .. })
    }
}

/// Contents of the optional remote-access file passed with `--config`.
///
/// ```json
/// {
///   "remote-machine": "login1",
///   "remote-user": "labeler",
///   "remote-environment": ["PATH=/opt/flyem/bin:$PATH"]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemoteAccessFile {
    #[serde(default)]
    pub remote_machine: Option<String>,
    #[serde(default)]
    pub remote_user: Option<String>,
    #[serde(default)]
    pub remote_environment: Vec<String>,
}

impl RemoteAccessFile {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| CalcError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_slice(&raw)
            .map_err(|e| CalcError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Turn the file into a launch mode. An empty or missing machine means
    /// the program runs locally and the other fields are ignored.
    pub fn into_launch_config(self, program: String) -> Result<LaunchConfig> {
        let host = match self.remote_machine {
            Some(host) if !host.trim().is_empty() => host,
            _ => return Ok(LaunchConfig::Local { program }),
        };

        for assignment in &self.remote_environment {
            validate_env_assignment(assignment)?;
        }

        Ok(LaunchConfig::Remote {
            program,
            host,
            user: self.remote_user.filter(|u| !u.is_empty()),
            env: self.remote_environment,
        })
    }
}

fn validate_env_assignment(assignment: &str) -> Result<()> {
    let Some((name, _)) = assignment.split_once('=') else {
        return Err(CalcError::Config(format!(
            "remote environment entry {:?} is not NAME=VALUE",
            assignment
        )));
    };
    let valid_name = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_name {
        return Err(CalcError::Config(format!(
            "remote environment entry {:?} has an invalid variable name",
            assignment
        )));
    }
    Ok(())
}

/// Settings for the remote store client.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `host:port` of the service proxy used to discover the store.
    pub discovery_proxy: Option<String>,
    /// Timeout applied to every outbound request.
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            discovery_proxy: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Process-wide configuration, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: SocketAddr,
    /// Root under which every session directory is created.
    pub staging_root: PathBuf,
    pub store: StoreConfig,
    pub launch: LaunchConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            staging_root: PathBuf::from("/tmp/calclabels"),
            store: StoreConfig::default(),
            launch: LaunchConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            ..Default::default()
        }
    }

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    pub fn with_discovery_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.store.discovery_proxy = Some(proxy.into());
        self
    }
}
