use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;

use crate::error::{CalcError, Result};

/// Attempts at drawing an unused identifier before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

/// One accepted submission: its identifier and private staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub dir: PathBuf,
}

impl Session {
    /// Path of a file inside the session directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// `<8 lowercase hex>-<unix seconds>`.
pub fn generate_session_id() -> String {
    let random: u32 = rand::thread_rng().gen();
    format!("{:08x}-{}", random, Utc::now().timestamp())
}

/// Allocates sessions under a staging root.
#[derive(Debug, Clone)]
pub struct SessionManager {
    root: PathBuf,
}

impl SessionManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a fresh session directory.
    ///
    /// The directory is created exclusively: an identifier that already has a
    /// directory is discarded and a new one drawn.
    pub async fn create(&self) -> Result<Session> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = generate_session_id();
            let dir = self.root.join(&id);
            match create_session_dir(&dir).await {
                Ok(()) => {
                    tracing::debug!(session_id = %id, dir = %dir.display(), "Created session");
                    return Ok(Session { id, dir });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::warn!(session_id = %id, "Session id collision, drawing a new one");
                }
                Err(source) => {
                    return Err(CalcError::Session {
                        path: self.root.clone(),
                        source,
                    })
                }
            }
        }

        Err(CalcError::Session {
            path: self.root.clone(),
            source: std::io::Error::new(
                ErrorKind::AlreadyExists,
                "no unused session id after repeated attempts",
            ),
        })
    }
}

/// Exclusive create, mode `0755`.
#[cfg(unix)]
async fn create_session_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.mode(0o755);
    builder.create(dir).await
}

#[cfg(not(unix))]
async fn create_session_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir(dir).await
}
