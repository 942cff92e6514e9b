//! Fire-and-forget launch of the external label computation.
//!
//! A [`JobLauncher`] starts the compute program with the session directory as
//! its only argument and returns as soon as the process is running. Job
//! progress is reported by the program itself through the status record, so
//! nothing here waits for completion or captures output.
//!
//! # Implementations
//!
//! - [`LocalLauncher`]: child process on this host
//! - [`RemoteLauncher`]: `ssh` to a login host, exporting environment first
//!
//! [`from_config`] picks one from [`LaunchConfig`].

pub mod local;
pub mod remote;

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use crate::config::LaunchConfig;
use crate::error::{CalcError, Result};

pub use local::LocalLauncher;
pub use remote::RemoteLauncher;

/// Starts the compute program for one session.
pub trait JobLauncher: Send + Sync + std::fmt::Debug {
    /// Start the program on `session_dir`. `Ok` means the process was
    /// spawned, not that the job succeeded.
    fn launch(&self, session_dir: &Path) -> Result<()>;
}

pub fn from_config(config: &LaunchConfig) -> Arc<dyn JobLauncher> {
    match config {
        LaunchConfig::Local { program } => Arc::new(LocalLauncher::new(program.clone())),
        LaunchConfig::Remote {
            program,
            host,
            user,
            env,
        } => Arc::new(RemoteLauncher::new(
            program.clone(),
            host.clone(),
            user.clone(),
            env.clone(),
        )),
    }
}

/// Spawn `command` detached from the caller. A background task reaps the
/// child and logs how it ended.
pub(crate) fn spawn_detached(mut command: Command, session_dir: &Path) -> Result<()> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let mut child = command.spawn().map_err(|e| {
        CalcError::Launch(format!(
            "cannot start {:?}: {}",
            command.as_std().get_program(),
            e
        ))
    })?;

    let pid = child.id();
    let dir = session_dir.display().to_string();
    tracing::info!(pid = ?pid, session_dir = %dir, "Launched compute job");

    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => {
                tracing::debug!(pid = ?pid, session_dir = %dir, "Compute job process exited");
            }
            Ok(status) => {
                tracing::warn!(
                    pid = ?pid,
                    session_dir = %dir,
                    exit_code = ?status.code(),
                    "Compute job process exited with failure"
                );
            }
            Err(e) => {
                tracing::warn!(pid = ?pid, session_dir = %dir, error = %e, "Lost track of compute job");
            }
        }
    });

    Ok(())
}
