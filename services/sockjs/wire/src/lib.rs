//! Frame encoding, send payload decoding, and JavaScript string escaping for
//! the SockJS gateway.
//!
//! This crate is the message codec shared by every HTTP transport. It has no
//! knowledge of sessions or HTTP; it only turns messages into frame bodies and
//! client payloads into messages.
//!
//! ## Wire Format
//!
//! ```text
//! o                      open (handshake)
//! h                      heartbeat
//! a["m1","m2",...]       array of messages, never split within one flush
//! c[code,"reason"]       close
//! ```
//!
//! Polling and streaming transports terminate each frame with `\n`. JSONP
//! wraps the escaped body as `callback("<escaped>");\r\n`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod escape;
pub mod frame;

// Re-export main types
pub use codec::{decode_messages, decode_payload, PayloadEncoding, FORM_FIELD_PREFIX};
pub use error::WireError;
pub use escape::{escape_for_javascript, wrap_jsonp};
pub use frame::{
    Frame, CLOSE_BROKEN_JSON, CLOSE_BROKEN_JSON_REASON, CLOSE_GO_AWAY, CLOSE_GO_AWAY_REASON,
};
