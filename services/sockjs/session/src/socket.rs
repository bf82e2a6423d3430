//! Application-facing socket handed out when a session opens.

use crate::session::Command;
use crate::SessionError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receives every session that completes its handshake.
///
/// Called from the session's own task, so implementations should hand the
/// socket off (typically with `tokio::spawn`) instead of blocking.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// A new session is open
    fn on_connection(&self, socket: SockJsSocket);
}

impl<F> ConnectionHandler for F
where
    F: Fn(SockJsSocket) + Send + Sync + 'static,
{
    fn on_connection(&self, socket: SockJsSocket) {
        self(socket)
    }
}

/// Cloneable outbound half of a socket
#[derive(Clone)]
pub struct SocketWriter {
    id: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
}

impl SocketWriter {
    pub(crate) fn new(id: Arc<str>, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { id, commands }
    }

    /// Session id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a message for delivery to the client
    pub fn write(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.commands
            .send(Command::Send(message.into()))
            .map_err(|_| SessionError::Closed(self.id.to_string()))
    }

    /// Close the session; the client receives `c[3000,"Go away!"]`
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close {
            code: sockjs_wire::CLOSE_GO_AWAY,
            reason: sockjs_wire::CLOSE_GO_AWAY_REASON.to_string(),
        });
    }

    /// Whether the session has shut down
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl fmt::Debug for SocketWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketWriter").field("id", &self.id).finish()
    }
}

/// Duplex handle to one open session
#[derive(Debug)]
pub struct SockJsSocket {
    writer: SocketWriter,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl SockJsSocket {
    pub(crate) fn new(writer: SocketWriter, inbound: mpsc::UnboundedReceiver<String>) -> Self {
        Self { writer, inbound }
    }

    /// Session id
    pub fn id(&self) -> &str {
        self.writer.id()
    }

    /// Queue a message for delivery to the client
    pub fn write(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.writer.write(message)
    }

    /// Close the session
    pub fn close(&self) {
        self.writer.close()
    }

    /// Next message from the client, in send order; `None` once the session
    /// is closed and all buffered messages were read
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Clone the outbound half, e.g. to write from another task
    pub fn writer(&self) -> SocketWriter {
        self.writer.clone()
    }
}
