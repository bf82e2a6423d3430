//! HTTP transports for the SockJS gateway.
//!
//! Mounts XHR polling, XHR streaming, and JSONP under a base path as an
//! `axum` router. Every route addresses a session as
//! `<prefix>/<server-id>/<session-id>/<transport>`; receive routes create
//! the session on first contact, send routes only reach existing sessions.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sockjs_http::{SockJsServer, TransportConfig};
//! use sockjs_session::{ConnectionHandler, SockJsSocket};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let handler: Arc<dyn ConnectionHandler> = Arc::new(|mut socket: SockJsSocket| {
//!     tokio::spawn(async move {
//!         while let Some(message) = socket.recv().await {
//!             let _ = socket.write(message);
//!         }
//!     });
//! });
//!
//! let server = SockJsServer::new(TransportConfig::default(), handler);
//! server
//!     .serve("127.0.0.1:8080".parse()?, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod headers;
pub mod jsonp;
pub mod server;
pub mod xhr;

pub use error::SendError;
pub use server::{SockJsServer, TransportConfig, TransportState};
