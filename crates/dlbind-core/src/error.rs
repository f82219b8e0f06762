//! Error type shared by the safe API, the C ABI and the harness.
//!
//! The loader has a single failure kind, "operation failed", distinguished only
//! by the diagnostic text. The variants here record which operation failed so
//! Rust callers can match on it; [`DlError::message`] yields the text the C ABI
//! stores in its error slot.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DlError {
    #[error("dlopen {}: {message}", .library.as_deref().unwrap_or("<main program>"))]
    Open {
        library: Option<String>,
        message: String,
    },
    #[error("dlsym {symbol}: {message}")]
    Symbol { symbol: String, message: String },
    #[error("dlclose: {message}")]
    Close { message: String },
    #[error("name contains an interior NUL byte: {name:?}")]
    InvalidName { name: String },
    #[error("invalid mode for dlopen: {mode:#x}")]
    InvalidMode { mode: i32 },
    #[error("mode exceeds the range of C int: {value}")]
    ModeOutOfRange { value: i64 },
    #[error("unknown loader constant: {name}")]
    UnknownConstant { name: String },
}

impl DlError {
    /// Diagnostic text as the loader (or the pre-loader check) reported it.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Open { message, .. } | Self::Symbol { message, .. } | Self::Close { message } => {
                message.clone()
            }
            Self::InvalidMode { .. } => crate::dlfcn::ERR_INVALID_MODE.to_string(),
            other => other.to_string(),
        }
    }
}
