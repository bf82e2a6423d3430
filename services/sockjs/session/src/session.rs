//! Core session management for the SockJS gateway.
//!
//! Each session is a task that owns all of its mutable state: lifecycle
//! state, outbound queue, the attached listener, and liveness timers. Every
//! mutation arrives as a [`Command`] over the session's channel, so requests
//! racing on the same session are serialized without a lock, and sessions
//! never contend with each other.

use crate::keepalive::{sleep_until_deadline, Liveness};
use crate::listener::Listener;
use crate::socket::{ConnectionHandler, SockJsSocket, SocketWriter};
use crate::SessionError;
use sockjs_wire::Frame;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Configuration for a session, fixed at creation
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// How long a session survives with no listener attached
    pub session_timeout: Duration,
    /// Interval between heartbeat frames on a quiet listener
    pub heartbeat_period: Duration,
    /// Frame bytes after which a streaming response is ended
    pub max_bytes_streaming: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(5),
            heartbeat_period: Duration::from_secs(25),
            max_bytes_streaming: 128 * 1024, // 128 KiB
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, handshake not yet delivered
    Connecting,
    /// Handshake delivered, application attached
    Open,
    /// Terminal
    Closed,
}

/// Mutations funneled through a session's task
#[derive(Debug)]
pub(crate) enum Command {
    /// Attach a listener, superseding any current one
    Attach(Listener),
    /// The client dropped the response behind listener `id`
    ListenerGone(u64),
    /// Outbound message from the application
    Send(String),
    /// Inbound messages from a client send request
    Receive(Vec<String>),
    /// Close the session with a final frame
    Close {
        /// Close code
        code: u16,
        /// Close reason
        reason: String,
    },
}

/// Cheap, cloneable reference to a running session
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: Arc<str>,
    uid: u64,
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Session id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Process-unique instance number, distinguishes sessions reusing an id
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Whether the session has stopped accepting commands
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Attach `listener`; any previously attached listener is closed first.
    ///
    /// Gives the listener back if the session already shut down.
    pub fn attach(&self, listener: Listener) -> Result<(), Listener> {
        self.commands
            .send(Command::Attach(listener))
            .map_err(|err| match err.0 {
                Command::Attach(listener) => listener,
                _ => unreachable!("attach only sends Command::Attach"),
            })
    }

    /// Deliver messages from the client to the application, in order
    pub fn deliver(&self, messages: Vec<String>) -> Result<(), SessionError> {
        self.commands
            .send(Command::Receive(messages))
            .map_err(|_| SessionError::Closed(self.id.to_string()))
    }

    /// Queue a message for the client
    pub fn send(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.commands
            .send(Command::Send(message.into()))
            .map_err(|_| SessionError::Closed(self.id.to_string()))
    }

    /// Close the session, sending `c[code,reason]` to an attached listener
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.commands.send(Command::Close {
            code,
            reason: reason.into(),
        });
    }
}

/// Start a session task. `on_exit` runs once the session has shut down.
pub(crate) fn spawn_session<F>(
    id: &str,
    uid: u64,
    config: SessionConfig,
    handler: Arc<dyn ConnectionHandler>,
    on_exit: F,
) -> SessionHandle
where
    F: FnOnce() + Send + 'static,
{
    let id: Arc<str> = Arc::from(id);
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let socket = SockJsSocket::new(SocketWriter::new(id.clone(), commands_tx.clone()), inbound_rx);
    let actor = SessionActor {
        id: id.clone(),
        state: SessionState::Connecting,
        queue: VecDeque::new(),
        listener: None,
        next_listener_id: 0,
        liveness: Liveness::new(config.heartbeat_period, config.session_timeout),
        close_frame: Frame::go_away(),
        commands: commands_rx,
        commands_tx: commands_tx.clone(),
        inbound_tx: Some(inbound_tx),
        pending_socket: Some(socket),
        handler,
    };

    debug!("Created session {} (uid {})", id, uid);
    tokio::spawn(async move {
        actor.run().await;
        on_exit();
    });

    SessionHandle {
        id,
        uid,
        commands: commands_tx,
    }
}

/// State owned by a session's task
struct SessionActor {
    id: Arc<str>,
    state: SessionState,
    queue: VecDeque<String>,
    listener: Option<(u64, Listener)>,
    next_listener_id: u64,
    liveness: Liveness,
    close_frame: Frame,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_tx: mpsc::UnboundedSender<Command>,
    inbound_tx: Option<mpsc::UnboundedSender<String>>,
    pending_socket: Option<SockJsSocket>,
    handler: Arc<dyn ConnectionHandler>,
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            let deadline = self.liveness.timeout_deadline();
            let heartbeat = self
                .heartbeat_armed()
                .then(|| self.liveness.heartbeat_deadline());

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },

                _ = sleep_until_deadline(heartbeat) => self.on_heartbeat(),

                _ = sleep_until_deadline(deadline) => {
                    info!("Session {} timed out with no listener attached", self.id);
                    self.state = SessionState::Closed;
                }
            }

            if self.state == SessionState::Closed {
                break;
            }
        }

        self.shutdown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Attach(listener) => self.attach(listener),
            Command::ListenerGone(listener_id) => {
                if matches!(self.listener, Some((current, _)) if current == listener_id) {
                    debug!("Listener {} of session {} dropped by client", listener_id, self.id);
                    self.detach();
                }
            }
            Command::Send(message) => {
                self.queue.push_back(message);
                self.flush();
            }
            Command::Receive(messages) => {
                self.liveness.touch();
                self.forward_inbound(messages);
            }
            Command::Close { code, reason } => {
                info!("Closing session {} ({} {})", self.id, code, reason);
                self.close_frame = Frame::close(code, reason);
                let frame = self.close_frame.clone();
                self.write_frame(&frame);
                self.state = SessionState::Closed;
            }
        }
    }

    fn attach(&mut self, mut listener: Listener) {
        let listener_id = self.next_listener_id;
        self.next_listener_id += 1;

        if let Some((old_id, mut old)) = self.listener.take() {
            debug!("Listener {} supersedes listener {} on session {}", listener_id, old_id, self.id);
            old.close();
        }

        let commands_tx = self.commands_tx.clone();
        listener.watch_close(move || {
            let _ = commands_tx.send(Command::ListenerGone(listener_id));
        });
        self.listener = Some((listener_id, listener));
        self.liveness.attached();

        match self.state {
            SessionState::Connecting => {
                if self.write_frame(&Frame::Open) {
                    self.open();
                }
            }
            SessionState::Open => self.flush(),
            SessionState::Closed => {}
        }
    }

    fn open(&mut self) {
        self.state = SessionState::Open;
        info!("Session {} open", self.id);
        if let Some(socket) = self.pending_socket.take() {
            self.handler.on_connection(socket);
        }
    }

    /// Send everything queued as one array frame
    fn flush(&mut self) {
        if self.queue.is_empty() || self.listener.is_none() {
            return;
        }

        let frame = Frame::Array(self.queue.drain(..).collect());
        if !self.write_frame(&frame) {
            // Never reached the client; put it back in front, order intact
            if let Frame::Array(messages) = frame {
                for message in messages.into_iter().rev() {
                    self.queue.push_front(message);
                }
            }
        }
    }

    /// Hand client messages to the application socket, in order
    fn forward_inbound(&self, messages: Vec<String>) {
        if let Some(inbound_tx) = &self.inbound_tx {
            for message in messages {
                if inbound_tx.send(message).is_err() {
                    debug!("Application dropped socket of session {}", self.id);
                    break;
                }
            }
        }
    }

    /// Heartbeats only go to an attached listener of an open session
    fn heartbeat_armed(&self) -> bool {
        self.state == SessionState::Open && self.listener.is_some()
    }

    fn on_heartbeat(&mut self) {
        if self.heartbeat_armed() && self.liveness.heartbeat_due() {
            debug!("Heartbeat on session {}", self.id);
            self.write_frame(&Frame::Heartbeat);
        }
    }

    /// Write through the attached listener; detaches it once it closes
    fn write_frame(&mut self, frame: &Frame) -> bool {
        let Some((_, listener)) = self.listener.as_mut() else {
            return false;
        };

        let delivered = listener.send_frame(frame);
        if delivered {
            self.liveness.touch();
        }
        if listener.is_closed() {
            self.detach();
        }
        delivered
    }

    fn detach(&mut self) {
        if let Some((_, mut listener)) = self.listener.take() {
            listener.close();
        }
        self.liveness.detached();
    }

    fn shutdown(&mut self) {
        self.state = SessionState::Closed;
        self.queue.clear();
        if let Some((_, mut listener)) = self.listener.take() {
            listener.close();
        }

        // Polls that raced with the close still get the final frame, and
        // sends that were already acknowledged still reach the application
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Attach(mut listener) => {
                    listener.send_frame(&self.close_frame);
                    listener.close();
                }
                Command::Receive(messages) => self.forward_inbound(messages),
                Command::Send(_) | Command::ListenerGone(_) | Command::Close { .. } => {}
            }
        }

        if self.inbound_tx.take().is_some() && self.pending_socket.is_some() {
            warn!("Session {} closed before its handshake completed", self.id);
        }
        self.pending_socket = None;
        info!("Session {} closed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{response_channel, PendingResponse};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn collecting_handler() -> (Arc<dyn ConnectionHandler>, mpsc::UnboundedReceiver<SockJsSocket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = move |socket: SockJsSocket| {
            let _ = tx.send(socket);
        };
        (Arc::new(handler), rx)
    }

    fn poll(session: &SessionHandle) -> PendingResponse {
        let (writer, pending) = response_channel();
        session
            .attach(Listener::polling(writer, Vec::new()))
            .expect("session should accept listener");
        pending
    }

    async fn body_of(pending: PendingResponse) -> String {
        let (_, body) = pending.into_parts().await;
        body.read_to_string().await
    }

    fn config() -> SessionConfig {
        SessionConfig {
            session_timeout: Duration::from_secs(60),
            heartbeat_period: Duration::from_secs(60),
            max_bytes_streaming: 4096,
        }
    }

    #[tokio::test]
    async fn test_handshake_then_messages() {
        let (handler, mut sockets) = collecting_handler();
        let session = spawn_session("s1", 1, config(), handler, || {});

        assert_eq!(body_of(poll(&session)).await, "o\n");

        let mut socket = sockets.recv().await.unwrap();
        assert_eq!(socket.id(), "s1");
        socket.write("hello").unwrap();
        assert_eq!(body_of(poll(&session)).await, "a[\"hello\"]\n");

        session.deliver(vec!["ping".into(), "pong".into()]).unwrap();
        assert_eq!(socket.recv().await.as_deref(), Some("ping"));
        assert_eq!(socket.recv().await.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn test_queue_order_across_reattachments() {
        let (handler, mut sockets) = collecting_handler();
        let session = spawn_session("s2", 2, config(), handler, || {});
        assert_eq!(body_of(poll(&session)).await, "o\n");
        let socket = sockets.recv().await.unwrap();

        let mut delivered = Vec::new();
        for batch in [vec!["1", "2"], vec!["3"], vec!["4", "5", "6"]] {
            for message in batch {
                socket.write(message).unwrap();
            }
            let body = body_of(poll(&session)).await;
            match Frame::decode(&body).unwrap() {
                Frame::Array(messages) => delivered.extend(messages),
                other => panic!("unexpected frame {:?}", other),
            }
        }

        assert_eq!(delivered, vec!["1", "2", "3", "4", "5", "6"]);
    }

    #[tokio::test]
    async fn test_new_listener_supersedes_old() {
        let (handler, mut sockets) = collecting_handler();
        let session = spawn_session("s3", 3, config(), handler, || {});
        assert_eq!(body_of(poll(&session)).await, "o\n");
        let socket = sockets.recv().await.unwrap();

        let first = poll(&session);
        let second = poll(&session);

        // The superseded poll ends empty, before any data is written
        assert_eq!(body_of(first).await, "");

        socket.write("fresh").unwrap();
        assert_eq!(body_of(second).await, "a[\"fresh\"]\n");
    }

    #[tokio::test]
    async fn test_close_sends_close_frame_and_exits() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();
        let (handler, mut sockets) = collecting_handler();
        let session = spawn_session("s4", 4, config(), handler, move || {
            flag.store(true, Ordering::SeqCst)
        });
        assert_eq!(body_of(poll(&session)).await, "o\n");
        let mut socket = sockets.recv().await.unwrap();

        let pending = poll(&session);
        socket.close();
        assert_eq!(body_of(pending).await, "c[3000,\"Go away!\"]\n");

        assert_eq!(socket.recv().await, None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(exited.load(Ordering::SeqCst));
        assert!(session.is_closed());
        assert!(socket.write("late").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_listener() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();
        let (handler, _sockets) = collecting_handler();
        let session = spawn_session(
            "s5",
            5,
            SessionConfig {
                session_timeout: Duration::from_secs(5),
                ..config()
            },
            handler,
            move || flag.store(true, Ordering::SeqCst),
        );
        assert_eq!(body_of(poll(&session)).await, "o\n");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!session.is_closed());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(session.is_closed());
        assert!(exited.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attached_listener_holds_off_timeout() {
        let (handler, _sockets) = collecting_handler();
        let session = spawn_session(
            "s6",
            6,
            SessionConfig {
                session_timeout: Duration::from_secs(5),
                heartbeat_period: Duration::from_secs(60),
                ..config()
            },
            handler,
            || {},
        );
        assert_eq!(body_of(poll(&session)).await, "o\n");

        let (writer, pending) = response_channel();
        session
            .attach(Listener::streaming(writer, Vec::new(), 4096))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!session.is_closed());
        drop(pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_on_quiet_listener() {
        let (handler, _sockets) = collecting_handler();
        let session = spawn_session(
            "s7",
            7,
            SessionConfig {
                session_timeout: Duration::from_secs(5),
                heartbeat_period: Duration::from_secs(25),
                ..config()
            },
            handler,
            || {},
        );
        assert_eq!(body_of(poll(&session)).await, "o\n");

        let started = tokio::time::Instant::now();
        let body = body_of(poll(&session)).await;
        assert_eq!(body, "h\n");
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() <= Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_within_one_period_of_last_frame() {
        let (handler, mut sockets) = collecting_handler();
        let session = spawn_session(
            "s9",
            9,
            SessionConfig {
                session_timeout: Duration::from_secs(60),
                heartbeat_period: Duration::from_secs(25),
                ..config()
            },
            handler,
            || {},
        );
        assert_eq!(body_of(poll(&session)).await, "o\n");
        let socket = sockets.recv().await.unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        socket.write("m").unwrap();
        assert_eq!(body_of(poll(&session)).await, "a[\"m\"]\n");

        let last_frame = tokio::time::Instant::now();
        assert_eq!(body_of(poll(&session)).await, "h\n");
        let quiet_for = last_frame.elapsed();
        assert!(quiet_for >= Duration::from_secs(20));
        assert!(quiet_for <= Duration::from_secs(25));
    }

    #[tokio::test]
    async fn test_send_queued_behind_close_still_delivered() {
        let (handler, mut sockets) = collecting_handler();
        let session = spawn_session("s10", 10, config(), handler, || {});
        assert_eq!(body_of(poll(&session)).await, "o\n");
        let mut socket = sockets.recv().await.unwrap();

        // Both commands are queued before the session task runs again
        socket.close();
        session.deliver(vec!["last words".into()]).unwrap();

        assert_eq!(socket.recv().await.as_deref(), Some("last words"));
        assert_eq!(socket.recv().await, None);
    }

    #[tokio::test]
    async fn test_client_disconnect_detaches_listener() {
        let (handler, mut sockets) = collecting_handler();
        let session = spawn_session("s8", 8, config(), handler, || {});
        assert_eq!(body_of(poll(&session)).await, "o\n");
        let socket = sockets.recv().await.unwrap();

        // Client gives up on this poll before anything is written
        drop(poll(&session));
        tokio::time::sleep(Duration::from_millis(20)).await;

        socket.write("kept").unwrap();
        assert_eq!(body_of(poll(&session)).await, "a[\"kept\"]\n");
    }
}
