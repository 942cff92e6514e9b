use std::path::Path;

use tokio::process::Command;

use super::{spawn_detached, JobLauncher};
use crate::error::Result;

/// Runs the compute program on a login host over ssh.
///
/// The remote command line exports each configured `NAME=VALUE` before
/// invoking the program. Values are passed unquoted so that references such
/// as `$PATH` expand on the remote side.
#[derive(Debug, Clone)]
pub struct RemoteLauncher {
    program: String,
    host: String,
    user: Option<String>,
    env: Vec<String>,
    ssh: String,
}

impl RemoteLauncher {
    pub fn new(program: String, host: String, user: Option<String>, env: Vec<String>) -> Self {
        Self {
            program,
            host,
            user,
            env,
            ssh: "ssh".to_string(),
        }
    }

    /// Use a different remote-shell client than `ssh`.
    pub fn with_ssh_program(mut self, ssh: impl Into<String>) -> Self {
        self.ssh = ssh.into();
        self
    }

    /// `user@host`, or just `host` when no user is configured.
    pub fn target(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// Command line executed by the remote shell.
    pub fn remote_command(&self, session_dir: &Path) -> String {
        let mut line = String::new();
        for assignment in &self.env {
            line.push_str("export ");
            line.push_str(assignment);
            line.push_str("; ");
        }
        line.push_str(&self.program);
        line.push(' ');
        line.push_str(&shell_quote(&session_dir.display().to_string()));
        line
    }
}

impl JobLauncher for RemoteLauncher {
    fn launch(&self, session_dir: &Path) -> Result<()> {
        let mut command = Command::new(&self.ssh);
        command
            .arg(self.target())
            .arg(self.remote_command(session_dir));
        tracing::debug!(target_host = %self.target(), "Launching over remote shell");
        spawn_detached(command, session_dir)
    }
}

/// Single-quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
