//! Error types for putusan-dl
//!
//! Every pipeline stage returns [`Result`]. The orchestrator decides per kind
//! whether a failure is recorded and skipped or halts the run; recoverable
//! gate rejections live in [`crate::core::gate::Rejection`] instead.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for putusan-dl operations
#[derive(Debug, Error)]
pub enum Error {
    /// Network fetch failed (listing, detail or file endpoint)
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// Local read/write/seek failure while staging a download
    #[error("staging error at {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Storage backend refused or failed to commit an object
    #[error("storage error for '{key}': {message}")]
    Storage { key: String, message: String },

    /// Invalid configuration or parameters
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The run was cancelled at a page or item boundary
    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Transport failure for `url`, keeping the underlying message
    pub fn transport(url: &str, err: impl std::fmt::Display) -> Self {
        Error::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    /// Staging failure for the file at `path`
    pub fn staging(path: &Path, source: std::io::Error) -> Self {
        Error::Staging {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Storage failure for the object at `key`
    pub fn storage(key: &str, err: impl std::fmt::Display) -> Self {
        Error::Storage {
            key: key.to_string(),
            message: err.to_string(),
        }
    }

    /// Short label used in logs and the JSON report
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Transport { .. } => "transport",
            Error::Staging { .. } => "staging",
            Error::Storage { .. } => "storage",
            Error::Config(_) => "config",
            Error::Cancelled => "cancelled",
        }
    }
}

/// Convenience result type for putusan-dl operations
pub type Result<T> = std::result::Result<T, Error>;
