use std::path::Path;

use tokio::process::Command;

use super::{spawn_detached, JobLauncher};
use crate::error::Result;

/// Runs the compute program as a child of the service.
#[derive(Debug, Clone)]
pub struct LocalLauncher {
    program: String,
}

impl LocalLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl JobLauncher for LocalLauncher {
    fn launch(&self, session_dir: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.arg(session_dir);
        spawn_detached(command, session_dir)
    }
}
