use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("download failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("remote returned status {status} for {url}")]
    FetchStatus { url: String, status: u16 },

    #[error("attachment registration failed: {0}")]
    RegisterFailed(String),

    #[error("attachment store lookup failed: {0}")]
    StoreLookupFailed(String),
}

pub type Result<T> = std::result::Result<T, AttachError>;
