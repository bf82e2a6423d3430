//! Session error types.

use thiserror::Error;

/// Session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The HTTP response behind a listener is gone
    #[error("response already closed")]
    ResponseClosed,

    /// The session has been closed and accepts no more traffic
    #[error("session {0} is closed")]
    Closed(String),
}
