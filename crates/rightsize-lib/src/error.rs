//! Error types for the rightsize library

use thiserror::Error;

/// Errors raised while fetching the statistics snapshot
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// The request never produced a response (DNS, connect, timeout, ...)
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// The backend answered with a non-2xx status
    #[error("statistics backend returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The response body was not a valid statistics snapshot
    #[error("failed to decode statistics snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors raised while building the mutator configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid statistics URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}
