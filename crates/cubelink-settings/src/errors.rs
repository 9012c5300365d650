//! Settings errors.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid JSON or does not match the settings shape.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A timer that drives the connection was configured as zero.
    #[error("timing.{field} must be greater than zero")]
    ZeroDuration {
        /// camelCase field name.
        field: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
