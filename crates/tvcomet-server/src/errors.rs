//! Mailbox hub errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors returned by the mailbox hub.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// The hub has stopped accepting clients.
    #[error("comet hub is shutting down")]
    ShuttingDown,
    /// The mailbox disappeared while a request was using it.
    #[error("unknown mailbox {0}")]
    UnknownMailbox(String),
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}
