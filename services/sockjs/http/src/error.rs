//! Outcomes of rejected transport requests.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use sockjs_wire::WireError;
use thiserror::Error;

/// Reasons a transport request is refused. Each one is terminal for the
/// request that caused it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// A required query or body parameter is absent
    #[error("\"{0}\" parameter required")]
    MissingParameter(&'static str),

    /// The send body has a content type the transport does not accept
    #[error("Invalid Content-Type")]
    UnsupportedContentType,

    /// Empty body, or a form body without a usable `d=` field
    #[error("Payload expected.")]
    EmptyOrMalformedPayload,

    /// No live session for the id in the path
    #[error("unknown session")]
    UnknownSession,

    /// The payload is not a JSON array of strings
    #[error("Broken JSON encoding.")]
    InvalidJson,
}

impl SendError {
    /// HTTP status for this outcome
    pub fn status(&self) -> StatusCode {
        match self {
            SendError::UnknownSession => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain-text body for this outcome
    pub fn body(&self) -> String {
        match self {
            SendError::UnknownSession => String::new(),
            SendError::MissingParameter(_) => format!("{}\n", self),
            other => other.to_string(),
        }
    }
}

impl From<WireError> for SendError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::ContentType(_) => SendError::UnsupportedContentType,
            WireError::Json(_) => SendError::InvalidJson,
            WireError::EmptyPayload
            | WireError::FormEncoding
            | WireError::Type(_)
            | WireError::Malformed => SendError::EmptyOrMalformedPayload,
        }
    }
}

impl IntoResponse for SendError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        if body.is_empty() {
            return status.into_response();
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=UTF-8")],
            body,
        )
            .into_response()
    }
}
