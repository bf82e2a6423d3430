//! Listeners: the live binding between a session and one in-flight response.
//!
//! Every transport style is a [`ListenerKind`] variant rather than its own
//! type; they share the capability set `send_frame` / `close` and differ only
//! in framing and in when they end the response.
//!
//! - `Polling` writes `<frame>\n` and ends the response after one frame.
//! - `Streaming` writes a prelude once, then `<frame>\n` per call, ending the
//!   response when the byte budget is used up.
//! - `JsonP` writes `callback("<escaped frame>");\r\n` and ends after one frame.

use crate::response::ResponseWriter;
use bytes::Bytes;
use sockjs_wire::{wrap_jsonp, Frame};
use tokio::task::JoinHandle;
use tracing::debug;

/// Content type of every frame-carrying response
pub const JAVASCRIPT_CONTENT_TYPE: &str = "application/javascript; charset=UTF-8";

/// Cache-Control sent with frame-carrying responses
pub const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Prelude length: 2048 filler bytes plus a newline
pub const STREAMING_PRELUDE_LEN: usize = 2048 + 1;

const fn build_prelude() -> [u8; STREAMING_PRELUDE_LEN] {
    let mut bytes = [b'h'; STREAMING_PRELUDE_LEN];
    bytes[STREAMING_PRELUDE_LEN - 1] = b'\n';
    bytes
}

/// Filler written before the first streamed frame so browsers start
/// processing the response incrementally
pub static STREAMING_PRELUDE: [u8; STREAMING_PRELUDE_LEN] = build_prelude();

/// Transport style of a listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerKind {
    /// One frame per response (XHR polling)
    Polling,
    /// Many frames per response, bounded by a byte budget (XHR streaming)
    Streaming {
        /// Frame bytes after which the response is ended
        max_bytes: usize,
    },
    /// One frame per response, wrapped in a JavaScript callback
    JsonP {
        /// Name of the client-side callback
        callback: String,
    },
}

/// Binding of a session to one HTTP response
#[derive(Debug)]
pub struct Listener {
    kind: ListenerKind,
    writer: ResponseWriter,
    headers: Vec<(String, String)>,
    bytes_sent: usize,
    closed: bool,
    close_hook: Option<JoinHandle<()>>,
}

impl Listener {
    /// Create a listener; `headers` are added to the response head on the
    /// first frame, after the content type and cache headers
    pub fn new(kind: ListenerKind, writer: ResponseWriter, headers: Vec<(String, String)>) -> Self {
        Self {
            kind,
            writer,
            headers,
            bytes_sent: 0,
            closed: false,
            close_hook: None,
        }
    }

    /// Polling listener
    pub fn polling(writer: ResponseWriter, headers: Vec<(String, String)>) -> Self {
        Self::new(ListenerKind::Polling, writer, headers)
    }

    /// Streaming listener with a byte budget
    pub fn streaming(writer: ResponseWriter, headers: Vec<(String, String)>, max_bytes: usize) -> Self {
        Self::new(ListenerKind::Streaming { max_bytes }, writer, headers)
    }

    /// Callback-wrapped listener
    pub fn jsonp(
        writer: ResponseWriter,
        headers: Vec<(String, String)>,
        callback: impl Into<String>,
    ) -> Self {
        Self::new(
            ListenerKind::JsonP {
                callback: callback.into(),
            },
            writer,
            headers,
        )
    }

    /// Transport style
    pub fn kind(&self) -> &ListenerKind {
        &self.kind
    }

    /// Frame bytes written so far (prelude excluded)
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Whether the listener has ended its response
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Render and transmit one frame.
    ///
    /// Returns `false` when the frame could not be handed to the HTTP layer
    /// because the connection was already gone; the listener is closed in
    /// that case. A polling listener also closes itself after a successful
    /// send, a streaming one once its budget is reached.
    pub fn send_frame(&mut self, frame: &Frame) -> bool {
        if self.closed {
            return false;
        }

        if !self.writer.head_written() {
            self.prepare_head();
            if let ListenerKind::Streaming { .. } = self.kind {
                if self
                    .writer
                    .write(Bytes::from_static(&STREAMING_PRELUDE))
                    .is_err()
                {
                    return self.connection_gone();
                }
            }
        }

        let chunk = match &self.kind {
            ListenerKind::Polling | ListenerKind::Streaming { .. } => frame.encode_line(),
            ListenerKind::JsonP { callback } => Bytes::from(wrap_jsonp(callback, &frame.encode())),
        };
        let len = chunk.len();

        if self.writer.write(chunk).is_err() {
            return self.connection_gone();
        }
        self.bytes_sent += len;

        let done = match self.kind {
            ListenerKind::Polling | ListenerKind::JsonP { .. } => true,
            ListenerKind::Streaming { max_bytes } => self.bytes_sent >= max_bytes,
        };
        if done {
            self.close();
        }
        true
    }

    /// End the response and stop watching for disconnects. Idempotent.
    ///
    /// A response that never carried a frame still gets the full head.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(hook) = self.close_hook.take() {
            hook.abort();
        }
        if !self.writer.head_written() {
            self.prepare_head();
        }
        self.writer.end();
    }

    /// Run `on_gone` if the client drops the response before the listener
    /// closes it. The hook is cancelled by [`close`](Self::close).
    pub fn watch_close<F>(&mut self, on_gone: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed {
            return;
        }
        if let Some(notifier) = self.writer.take_close_notifier() {
            self.close_hook = Some(tokio::spawn(async move {
                notifier.closed().await;
                on_gone();
            }));
        }
    }

    fn prepare_head(&mut self) {
        self.writer.put_header("Content-Type", JAVASCRIPT_CONTENT_TYPE);
        self.writer.put_header("Cache-Control", NO_CACHE);
        for (name, value) in self.headers.drain(..) {
            self.writer.put_header(name, value);
        }
    }

    fn connection_gone(&mut self) -> bool {
        debug!("Response closed by peer before frame was written");
        self.close();
        false
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}
