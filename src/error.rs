//! Error types for Leakwatch.
//!
//! Poll failures are never fatal. Every [`FetchError`] is caught at the
//! poller boundary, logged, and the loop carries on with the last good
//! snapshot.

use axum::http::StatusCode;
use thiserror::Error;

/// Failure of a single snapshot fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The request failed at the network layer (DNS, connection reset, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("unexpected status: {0}")]
    Protocol(StatusCode),

    /// The body was not a well-shaped snapshot.
    #[error("malformed snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

impl FetchError {
    /// Short label used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Protocol(_) => "protocol",
            FetchError::Decode(_) => "decode",
        }
    }
}

/// Failure loading the floor layout file.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("failed to read layout file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid layout file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("sensor '{sensor}' is placed on both '{first}' and '{second}'")]
    DuplicateSensor {
        sensor: String,
        first: String,
        second: String,
    },
}

/// Rejection of a gateway push to the relay.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unknown gateway '{0}'")]
    UnknownGateway(String),

    #[error("invalid reading payload: {0}")]
    InvalidPayload(String),
}

impl IngestError {
    /// HTTP status the relay answers with.
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::UnknownGateway(_) => StatusCode::NOT_FOUND,
            IngestError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_kinds() {
        let decode = serde_json::from_str::<u32>("nope").unwrap_err();
        assert_eq!(FetchError::Decode(decode).kind(), "decode");
        assert_eq!(
            FetchError::Protocol(StatusCode::BAD_GATEWAY).kind(),
            "protocol"
        );
        assert_eq!(FetchError::Transport("reset".into()).kind(), "transport");
    }

    #[test]
    fn test_ingest_error_status() {
        assert_eq!(
            IngestError::UnknownGateway("999".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            IngestError::InvalidPayload("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
