//! SLB client errors

use thiserror::Error;

/// Errors that can occur when interacting with the SLB control plane
#[derive(Debug, Error)]
pub enum SlbError {
    /// HTTP transport error (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SLB API rejected the request (4xx or an error envelope)
    #[error("SLB API error: {0}")]
    Api(String),

    /// SLB API failed on the server side (5xx)
    #[error("SLB API unavailable: {0}")]
    Unavailable(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (token exchange failed, token rejected)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl SlbError {
    /// Returns true when the remote resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for network failures and server-side errors.
    ///
    /// These are worth retrying on the next reconciliation pass without any
    /// operator involvement.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Unavailable(_))
    }
}
