//! Error types for the retrieval client.

use std::time::Duration;

use thiserror::Error;

/// Failures talking to the monitoring API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("api error {code}: {message} (request {request_id})")]
    Api {
        code: String,
        message: String,
        request_id: String,
    },

    #[error("malformed response: {source}")]
    Malformed {
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures surfaced by retrieval and discovery.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to retrieve datapoints: {0}")]
    Retrieval(#[source] ApiError),

    #[error("failed to decode datapoints: {source}")]
    Decode {
        /// Raw response body, kept for diagnosis.
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to describe metric meta for {namespace}: {source}")]
    Discovery {
        namespace: String,
        #[source]
        source: ApiError,
    },
}

/// Invalid rate limiter construction.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit must be at least one request per second")]
    ZeroRate,
}
