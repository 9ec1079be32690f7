//! Error types for Slack operations

use thiserror::Error;

/// Result type for Slack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to Slack or reading its payloads
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure
    #[error("Slack HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Slack answered with `ok: false`
    #[error("Slack API error from {method}: {error}")]
    Api { method: String, error: String },

    /// Bad or missing credentials
    #[error("Slack authentication error: {0}")]
    Auth(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An inbound payload could not be understood
    #[error("Invalid payload: {0}")]
    Payload(String),
}

impl From<Error> for herald_core::Error {
    fn from(err: Error) -> Self {
        herald_core::Error::Gateway(err.to_string())
    }
}
