//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Send body was empty or failed the form prefix check
    #[error("payload expected")]
    EmptyPayload,

    /// Declared content type is not one the send route understands
    #[error("unsupported content type: {0}")]
    ContentType(String),

    /// Payload did not decode to a JSON array of strings
    #[error("broken json encoding: {0}")]
    Json(#[from] serde_json::Error),

    /// Form value could not be percent-decoded as UTF-8
    #[error("malformed form encoding")]
    FormEncoding,

    /// Frame body did not start with a known type marker
    #[error("unknown frame type {0:?}")]
    Type(char),

    /// Frame body had trailing data or a missing payload
    #[error("malformed frame")]
    Malformed,
}
