//! Error types for the comet transport.

use thiserror::Error;

/// Errors raised while receiving or decoding live updates.
#[derive(Debug, Error)]
pub enum CometError {
    /// The payload was not valid JSON or did not have the envelope shape.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),
    /// A WebSocket frame carried bytes that are not UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    /// Connecting, sending or receiving failed at the transport level.
    #[error("transport error: {0}")]
    Transport(String),
    /// The poll endpoint answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    /// The configured base URL could not be turned into an endpoint.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

impl CometError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MalformedEnvelope(_) => "malformed_envelope",
            Self::InvalidUtf8 => "invalid_utf8",
            Self::Transport(_) => "transport",
            Self::Status(_) => "status",
            Self::InvalidUrl(_) => "invalid_url",
        }
    }

    /// Whether the failure should be counted against the connection.
    ///
    /// A malformed envelope means the server did answer, so it is not a
    /// connectivity problem.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status(_))
    }
}

/// Error type returned by event listeners.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for comet operations.
pub type Result<T> = std::result::Result<T, CometError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_envelope_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = CometError::MalformedEnvelope(json_err);
        assert!(err.to_string().starts_with("malformed envelope:"));
        assert_eq!(err.error_kind(), "malformed_envelope");
    }

    #[test]
    fn status_display() {
        let err = CometError::Status(503);
        assert_eq!(err.to_string(), "unexpected HTTP status 503");
    }

    #[test]
    fn transport_failures_classified() {
        assert!(CometError::Transport("refused".into()).is_transport_failure());
        assert!(CometError::Status(500).is_transport_failure());
        assert!(!CometError::InvalidUtf8.is_transport_failure());
        assert!(!CometError::InvalidUrl("x".into()).is_transport_failure());
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("[").unwrap_err();
        let err: CometError = json_err.into();
        assert!(matches!(err, CometError::MalformedEnvelope(_)));
    }
}
