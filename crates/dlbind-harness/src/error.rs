//! Harness error type.

use dlbind_core::DlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Loader(#[from] DlError),
    #[error("logger: {0}")]
    Logger(String),
    #[error("{path}: {count} structured-log violation(s)")]
    InvalidLog { path: String, count: usize },
    #[error("probe failed: {0}")]
    ProbeFailed(String),
}
