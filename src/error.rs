//! Error types for log scanning and report generation

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading variants or scanning benchmark logs
#[derive(Error, Debug)]
pub enum CardlogError {
    #[error("Log file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown variant: {0}")]
    UnknownVariant(String),

    #[error("Invalid variant configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid settings list '{0}': expected e.g. 1-5 or 1,2,4")]
    InvalidSettings(String),
}

impl CardlogError {
    /// Map an `io::Error` raised while touching `path`, separating out a missing file
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            CardlogError::FileNotFound { path }
        } else {
            CardlogError::Io { path, source }
        }
    }
}

/// Result type for cardlog operations
pub type Result<T> = std::result::Result<T, CardlogError>;
