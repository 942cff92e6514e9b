use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to the remote store. Callers wrap these with the
/// context of what was being fetched or written.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
}

#[derive(Error, Debug)]
pub enum CalcError {
    #[error("JSON did not pass validation: {0}")]
    Validation(String),

    #[error("DVID server could not be located: {0}")]
    StoreResolution(String),

    #[error("No permission to write session directory under {path}: {source}")]
    Session {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{artifact} could not be read from {url}: {reason}")]
    Staging {
        artifact: &'static str,
        url: String,
        reason: String,
    },

    #[error("Job dispatch failed: {0}")]
    Dispatch(String),

    #[error("Job launch failed: {0}")]
    Launch(String),

    #[error("DVID job status could not be read from {url}: {reason}")]
    StatusRead { url: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CalcError>;
