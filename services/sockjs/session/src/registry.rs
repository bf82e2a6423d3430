//! Session registry shared by every transport.
//!
//! The registry is the only place sessions are created or removed. Creation
//! goes through the map's per-shard entry lock, so concurrent first contacts
//! for the same id always end up with the same session.

use crate::listener::Listener;
use crate::session::{spawn_session, SessionConfig, SessionHandle};
use crate::socket::ConnectionHandler;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sockjs_wire::{CLOSE_GO_AWAY, CLOSE_GO_AWAY_REASON};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Attempts at attaching a listener before giving up on a session that keeps
/// shutting down underneath us
const ATTACH_ATTEMPTS: usize = 2;

/// Process-wide map from session id to running session
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionHandle>>,
    next_uid: AtomicU64,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live session for `id`, creating and starting one if there
    /// is none. A session that has closed counts as absent and is replaced.
    pub fn get_or_create(
        &self,
        id: &str,
        config: &SessionConfig,
        handler: &Arc<dyn ConnectionHandler>,
    ) -> SessionHandle {
        match self.sessions.entry(id.to_string()) {
            Entry::Occupied(entry) if !entry.get().is_closed() => entry.get().clone(),
            Entry::Occupied(mut entry) => {
                debug!("Replacing closed session {}", id);
                let session = self.spawn(id, config, handler);
                entry.insert(session.clone());
                session
            }
            Entry::Vacant(entry) => {
                let session = self.spawn(id, config, handler);
                entry.insert(session.clone());
                session
            }
        }
    }

    /// Create a session under a freshly generated id
    pub fn create(&self, config: &SessionConfig, handler: &Arc<dyn ConnectionHandler>) -> SessionHandle {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.get_or_create(&id, config, handler)
    }

    /// Find a live session without creating one
    pub fn lookup(&self, id: &str) -> Option<SessionHandle> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .filter(|session| !session.is_closed())
    }

    /// Remove the session for `id` and shut it down. An attached listener
    /// receives the go-away close frame.
    pub fn evict(&self, id: &str) -> Option<SessionHandle> {
        let (_, session) = self.sessions.remove(id)?;
        debug!("Evicting session {}", id);
        session.close(CLOSE_GO_AWAY, CLOSE_GO_AWAY_REASON);
        Some(session)
    }

    /// Obtain or create the session for `id` and attach `listener` to it
    pub fn register_listener(
        &self,
        id: &str,
        config: &SessionConfig,
        handler: &Arc<dyn ConnectionHandler>,
        mut listener: Listener,
    ) -> Option<SessionHandle> {
        for _ in 0..ATTACH_ATTEMPTS {
            let session = self.get_or_create(id, config, handler);
            match session.attach(listener) {
                Ok(()) => return Some(session),
                Err(returned) => listener = returned,
            }
        }

        warn!("Could not attach listener to session {}", id);
        listener.close();
        None
    }

    /// Whether a live session exists for `id`
    pub fn contains(&self, id: &str) -> bool {
        self.lookup(id).is_some()
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn spawn(
        &self,
        id: &str,
        config: &SessionConfig,
        handler: &Arc<dyn ConnectionHandler>,
    ) -> SessionHandle {
        let uid = self.next_uid.fetch_add(1, Ordering::Relaxed);
        let sessions = Arc::downgrade(&self.sessions);
        let key = id.to_string();

        spawn_session(id, uid, config.clone(), handler.clone(), move || {
            if let Some(sessions) = sessions.upgrade() {
                // Only evict ourselves, never a successor that reused the id
                if sessions.remove_if(&key, |_, session| session.uid() == uid).is_some() {
                    debug!("Evicted session {}", key);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::response_channel;
    use crate::socket::SockJsSocket;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn handler() -> (Arc<dyn ConnectionHandler>, mpsc::UnboundedReceiver<SockJsSocket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = move |socket: SockJsSocket| {
            let _ = tx.send(socket);
        };
        (Arc::new(handler), rx)
    }

    fn short_timeout() -> SessionConfig {
        SessionConfig {
            session_timeout: Duration::from_secs(5),
            heartbeat_period: Duration::from_secs(25),
            max_bytes_streaming: 4096,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let registry = SessionRegistry::new();
        let (handler, _sockets) = handler();
        let config = SessionConfig::default();

        let first = registry.get_or_create("abc", &config, &handler);
        let second = registry.get_or_create("abc", &config, &handler);

        assert_eq!(first.uid(), second.uid());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("abc"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_contact_creates_one_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (handler, _sockets) = handler();
        let config = SessionConfig::default();

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            let handler = handler.clone();
            let config = config.clone();
            tasks.push(tokio::spawn(async move {
                registry.get_or_create("race", &config, &handler).uid()
            }));
        }

        let mut uids = Vec::new();
        for task in tasks {
            uids.push(task.await.unwrap());
        }
        uids.dedup();
        assert_eq!(uids.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_never_creates() {
        let registry = SessionRegistry::new();
        assert!(registry.lookup("missing").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_create_generates_unique_ids() {
        let registry = SessionRegistry::new();
        let (handler, _sockets) = handler();
        let config = SessionConfig::default();

        let a = registry.create(&config, &handler);
        let b = registry.create(&config, &handler);
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_session_is_evicted_and_replaced() {
        let registry = SessionRegistry::new();
        let (handler, mut sockets) = handler();
        let config = short_timeout();

        let (writer, pending) = response_channel();
        let first = registry
            .register_listener("s1", &config, &handler, Listener::polling(writer, Vec::new()))
            .unwrap();
        let (_, body) = pending.into_parts().await;
        assert_eq!(body.read_to_string().await, "o\n");
        assert!(sockets.recv().await.is_some());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!registry.contains("s1"));
        assert!(registry.is_empty());

        // Same id again behaves as a brand-new session
        let (writer, pending) = response_channel();
        let second = registry
            .register_listener("s1", &config, &handler, Listener::polling(writer, Vec::new()))
            .unwrap();
        assert_ne!(first.uid(), second.uid());
        let (_, body) = pending.into_parts().await;
        assert_eq!(body.read_to_string().await, "o\n");
    }

    #[tokio::test]
    async fn test_closed_session_is_replaced_on_poll() {
        let registry = SessionRegistry::new();
        let (handler, _sockets) = handler();
        let config = SessionConfig::default();

        let first = registry.get_or_create("gone", &config, &handler);
        first.close(3000, "Go away!");
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(registry.lookup("gone").is_none());
        let second = registry.get_or_create("gone", &config, &handler);
        assert_ne!(first.uid(), second.uid());
    }

    #[tokio::test]
    async fn test_evict_stops_session() {
        let registry = SessionRegistry::new();
        let (handler, mut sockets) = handler();
        let config = SessionConfig::default();

        let (writer, pending) = response_channel();
        let session = registry
            .register_listener("e", &config, &handler, Listener::polling(writer, Vec::new()))
            .unwrap();
        let (_, body) = pending.into_parts().await;
        assert_eq!(body.read_to_string().await, "o\n");
        let mut socket = sockets.recv().await.unwrap();

        let (writer, pending) = response_channel();
        registry.register_listener("e", &config, &handler, Listener::polling(writer, Vec::new()));

        assert_eq!(registry.evict("e").map(|s| s.uid()), Some(session.uid()));
        let (_, body) = pending.into_parts().await;
        assert_eq!(body.read_to_string().await, "c[3000,\"Go away!\"]\n");

        assert_eq!(socket.recv().await, None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(session.is_closed());
        assert!(socket.writer().is_closed());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_evict_removes_mapping() {
        let registry = SessionRegistry::new();
        let (handler, _sockets) = handler();

        registry.get_or_create("x", &SessionConfig::default(), &handler);
        assert!(registry.evict("x").is_some());
        assert!(registry.lookup("x").is_none());
        assert!(registry.evict("x").is_none());
    }
}
