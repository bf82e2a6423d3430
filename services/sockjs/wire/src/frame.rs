//! Frame rendering for the wire protocol.
//!
//! A frame body is a one-character type marker optionally followed by a JSON
//! payload. Transports decide how a body is terminated or wrapped: polling and
//! streaming responses append `\n`, JSONP wraps the escaped body in a callback.

use crate::WireError;
use bytes::Bytes;

/// Close code sent when the application ends the session
pub const CLOSE_GO_AWAY: u16 = 3000;
/// Close reason paired with [`CLOSE_GO_AWAY`]
pub const CLOSE_GO_AWAY_REASON: &str = "Go away!";

/// Close code sent when a client posts an undecodable payload
pub const CLOSE_BROKEN_JSON: u16 = 2010;
/// Close reason paired with [`CLOSE_BROKEN_JSON`]
pub const CLOSE_BROKEN_JSON_REASON: &str = "Broken JSON encoding.";

/// One self-delimited protocol message unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Handshake, first frame of every session
    Open,
    /// Liveness frame, carries no payload
    Heartbeat,
    /// Batch of application messages in queue order
    Array(Vec<String>),
    /// Session termination with a code and reason
    Close {
        /// Close code
        code: u16,
        /// Human readable reason
        reason: String,
    },
}

impl Frame {
    /// Create a close frame
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Frame::Close {
            code,
            reason: reason.into(),
        }
    }

    /// Close frame sent when the application ends the session
    pub fn go_away() -> Self {
        Self::close(CLOSE_GO_AWAY, CLOSE_GO_AWAY_REASON)
    }

    /// Single-character type marker
    pub fn marker(&self) -> char {
        match self {
            Frame::Open => 'o',
            Frame::Heartbeat => 'h',
            Frame::Array(_) => 'a',
            Frame::Close { .. } => 'c',
        }
    }

    /// Render the frame body without any transport terminator
    pub fn encode(&self) -> String {
        match self {
            Frame::Open | Frame::Heartbeat => self.marker().to_string(),
            Frame::Array(messages) => {
                let payload = serde_json::Value::from(messages.as_slice());
                format!("a{}", payload)
            }
            Frame::Close { code, reason } => {
                let payload = serde_json::Value::Array(vec![
                    serde_json::Value::from(*code),
                    serde_json::Value::from(reason.as_str()),
                ]);
                format!("c{}", payload)
            }
        }
    }

    /// Render the frame as a newline-terminated line
    pub fn encode_line(&self) -> Bytes {
        let mut line = self.encode();
        line.push('\n');
        Bytes::from(line)
    }

    /// Parse a frame body, with or without its trailing newline
    pub fn decode(body: &str) -> Result<Frame, WireError> {
        let body = body.strip_suffix('\n').unwrap_or(body);
        let mut chars = body.chars();
        let marker = chars.next().ok_or(WireError::Malformed)?;
        let payload = chars.as_str();

        match marker {
            'o' | 'h' if !payload.is_empty() => Err(WireError::Malformed),
            'o' => Ok(Frame::Open),
            'h' => Ok(Frame::Heartbeat),
            'a' => Ok(Frame::Array(serde_json::from_str(payload)?)),
            'c' => {
                let (code, reason): (u16, String) = serde_json::from_str(payload)?;
                Ok(Frame::Close { code, reason })
            }
            other => Err(WireError::Type(other)),
        }
    }
}
