//! Fatal and per-operation error types.
//!
//! [`SortError`] covers genuine faults (I/O, unreadable metadata containers,
//! decode failures). Expected outcomes such as "no capture time" are not
//! errors: they are modelled as `Option` by the timestamp resolver and turned
//! into [`crate::error_collection::ErrorRecord`]s by the sorter.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while sorting, resolving or reporting.
#[derive(Debug, Error)]
pub enum SortError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read metadata container of {path}: {source}")]
    Exif {
        path: PathBuf,
        #[source]
        source: exif::Error,
    },

    #[error("Failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid source directory {path}: {reason}")]
    InvalidSource { path: PathBuf, reason: String },

    #[error("Report error: {0}")]
    Report(String),
}

impl SortError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type used throughout the crate.
pub type SortResult<T> = Result<T, SortError>;
