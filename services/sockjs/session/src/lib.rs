//! Session state machine, liveness timers, listeners, and session registry
//! for the SockJS gateway.
//!
//! A session is a durable, addressable channel that outlives any single HTTP
//! request. Transports attach short-lived listeners to it; the session keeps
//! outbound messages in order across attachments and expires when nobody
//! polls for long enough.
//!
//! ## Features
//!
//! - **Single listener**: attaching a listener closes the previous one first
//! - **Ordered delivery**: queued messages flush as one array frame, in order
//! - **Liveness**: heartbeat frames on quiet listeners, timeout while detached
//! - **Registry**: at most one session per id, even under concurrent creation
//!
//! ## Example
//!
//! ```rust,no_run
//! use sockjs_session::{
//!     response_channel, ConnectionHandler, Listener, SessionConfig, SessionRegistry, SockJsSocket,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let handler: Arc<dyn ConnectionHandler> = Arc::new(|mut socket: SockJsSocket| {
//!     tokio::spawn(async move {
//!         while let Some(message) = socket.recv().await {
//!             let _ = socket.write(message);
//!         }
//!     });
//! });
//!
//! let registry = SessionRegistry::new();
//! let config = SessionConfig::default();
//!
//! let (writer, pending) = response_channel();
//! registry.register_listener("session-1", &config, &handler, Listener::polling(writer, Vec::new()));
//!
//! let (head, body) = pending.into_parts().await;
//! assert_eq!(head.status, 200);
//! assert_eq!(body.read_to_string().await, "o\n");
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod keepalive;
pub mod listener;
pub mod registry;
pub mod response;
pub mod session;
pub mod socket;

pub use error::SessionError;
pub use keepalive::Liveness;
pub use listener::{
    Listener, ListenerKind, JAVASCRIPT_CONTENT_TYPE, NO_CACHE, STREAMING_PRELUDE,
    STREAMING_PRELUDE_LEN,
};
pub use registry::SessionRegistry;
pub use response::{response_channel, CloseNotifier, PendingResponse, ResponseBody, ResponseHead, ResponseWriter};
pub use session::{SessionConfig, SessionHandle, SessionState};
pub use socket::{ConnectionHandler, SockJsSocket, SocketWriter};
