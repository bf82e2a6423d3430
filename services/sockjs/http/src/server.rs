//! Router assembly and the shared state behind every transport handler.

use crate::error::SendError;
use crate::{headers, jsonp, xhr};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use sockjs_session::{ConnectionHandler, Listener, SessionConfig, SessionHandle, SessionRegistry};
use sockjs_wire::{decode_payload, PayloadEncoding, CLOSE_BROKEN_JSON, CLOSE_BROKEN_JSON_REASON};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Transport-level configuration
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Base path the transports are mounted under
    pub prefix: String,
    /// Whether responses carry the `JSESSIONID` affinity cookie
    pub insert_jsessionid: bool,
    /// Settings for sessions created through these transports
    pub session: SessionConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            prefix: "/echo".to_string(),
            insert_jsessionid: true,
            session: SessionConfig::default(),
        }
    }
}

/// State shared by every handler of one server
pub struct TransportState {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) config: TransportConfig,
    pub(crate) handler: Arc<dyn ConnectionHandler>,
}

impl TransportState {
    /// Attach `listener` to the session for `session_id`, creating it on first contact
    pub(crate) fn attach(&self, session_id: &str, listener: Listener) -> Option<SessionHandle> {
        self.registry
            .register_listener(session_id, &self.config.session, &self.handler, listener)
    }

    /// Live session targeted by a send request
    pub(crate) fn send_target(&self, session_id: &str) -> Result<SessionHandle, SendError> {
        self.registry
            .lookup(session_id)
            .ok_or(SendError::UnknownSession)
    }

    /// Decode a send body and hand its messages to `session`.
    ///
    /// A body that is not UTF-8 is rejected like an empty one and leaves the
    /// session alone. A body that is not a JSON array of strings closes it.
    pub(crate) fn deliver(
        &self,
        session: &SessionHandle,
        body: &[u8],
        encoding: PayloadEncoding,
    ) -> Result<(), SendError> {
        let Ok(body) = std::str::from_utf8(body) else {
            return Err(SendError::EmptyOrMalformedPayload);
        };
        match decode_payload(body, encoding).map_err(SendError::from) {
            Ok(messages) => session
                .deliver(messages)
                .map_err(|_| SendError::UnknownSession),
            Err(SendError::InvalidJson) => {
                warn!("Closing session {}: broken JSON in send body", session.id());
                session.close(CLOSE_BROKEN_JSON, CLOSE_BROKEN_JSON_REASON);
                Err(SendError::InvalidJson)
            }
            Err(e) => Err(e),
        }
    }
}

/// SockJS transport server: a session registry plus the HTTP routes
/// that drive it
pub struct SockJsServer {
    state: Arc<TransportState>,
}

impl SockJsServer {
    /// Create a server that hands new sessions to `handler`
    pub fn new(config: TransportConfig, handler: Arc<dyn ConnectionHandler>) -> Self {
        Self {
            state: Arc::new(TransportState {
                registry: Arc::new(SessionRegistry::new()),
                config,
                handler,
            }),
        }
    }

    /// Registry holding this server's sessions
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.state.registry.clone()
    }

    /// Transport configuration
    pub fn config(&self) -> &TransportConfig {
        &self.state.config
    }

    /// Build the axum router with every transport mounted under the prefix
    pub fn router(&self) -> Router {
        let xhr_routes = Router::new()
            .route("/:server_id/:session_id/xhr", post(xhr::xhr_poll))
            .route("/:server_id/:session_id/xhr_streaming", post(xhr::xhr_streaming))
            .route("/:server_id/:session_id/xhr_send", post(xhr::xhr_send))
            .layer(headers::xhr_cors())
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                headers::preflight_extras,
            ));

        let routes = Router::new()
            .route("/:server_id/:session_id/jsonp", get(jsonp::jsonp_poll))
            .route("/:server_id/:session_id/jsonp_send", post(jsonp::jsonp_send))
            .merge(xhr_routes)
            .with_state(self.state.clone());

        match normalize_prefix(&self.state.config.prefix) {
            Some(prefix) => Router::new().nest(&prefix, routes),
            None => routes,
        }
    }

    /// Bind `addr` and serve until `shutdown` resolves
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(
            "SockJS transports listening on {} under {}",
            listener.local_addr()?,
            self.state.config.prefix
        );

        let app = self.router();
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            warn!("HTTP server stopped with error: {}", e);
            return Err(e.into());
        }

        info!("SockJS transports stopped");
        Ok(())
    }
}

/// `/echo/` and `echo` both become `/echo`; the root mounts routes directly
fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{}", trimmed))
    }
}
