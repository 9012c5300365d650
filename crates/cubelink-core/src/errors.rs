//! Envelope error types.

use thiserror::Error;

/// Errors decoding or inspecting an [`Envelope`](crate::Envelope).
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame was not a valid envelope document.
    #[error("invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// An option was present but had an unexpected shape.
    #[error("option `{key}` has an unexpected type: {source}")]
    Option {
        /// The option key.
        key: String,
        /// Underlying conversion error.
        #[source]
        source: serde_json::Error,
    },
}
