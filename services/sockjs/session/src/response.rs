//! Response sink shared between a listener and the HTTP layer.
//!
//! A [`ResponseWriter`] is the listener's end of one in-flight HTTP response:
//! it buffers headers until the first write, then streams body chunks. The
//! matching [`PendingResponse`] is held by the HTTP handler, which waits for
//! the head and turns the body into whatever its server framework expects.
//!
//! Dropping the [`PendingResponse`] (or the [`ResponseBody`] it becomes) is
//! how the HTTP layer reports that the client went away; the listener learns
//! about it through a [`CloseNotifier`].

use crate::SessionError;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

/// Status line and headers of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code
    pub status: u16,
    /// Header name/value pairs in insertion order
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
        }
    }
}

/// Create a connected writer/pending pair for one HTTP response
pub fn response_channel() -> (ResponseWriter, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::unbounded_channel();
    let (gone_tx, gone_rx) = oneshot::channel();

    let writer = ResponseWriter {
        head: ResponseHead::default(),
        head_tx: Some(head_tx),
        body_tx: Some(body_tx),
        gone_tx: Some(gone_tx),
    };
    let pending = PendingResponse {
        head_rx,
        body: ResponseBody {
            body_rx,
            _gone_rx: gone_rx,
        },
    };

    (writer, pending)
}

/// Writing half of an in-flight response
#[derive(Debug)]
pub struct ResponseWriter {
    head: ResponseHead,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: Option<mpsc::UnboundedSender<Bytes>>,
    gone_tx: Option<oneshot::Sender<()>>,
}

impl ResponseWriter {
    /// Set the status code; ignored once the head is written
    pub fn set_status(&mut self, status: u16) {
        self.head.status = status;
    }

    /// Add a header; ignored once the head is written
    pub fn put_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.head.headers.push((name.into(), value.into()));
    }

    /// Whether the head has been handed to the HTTP layer
    pub fn head_written(&self) -> bool {
        self.head_tx.is_none()
    }

    /// Whether [`end`](Self::end) has been called
    pub fn is_ended(&self) -> bool {
        self.body_tx.is_none()
    }

    /// Write a body chunk, sending the head first if needed
    pub fn write(&mut self, chunk: impl Into<Bytes>) -> Result<(), SessionError> {
        self.write_head()?;
        let body_tx = self.body_tx.as_ref().ok_or(SessionError::ResponseClosed)?;
        body_tx
            .send(chunk.into())
            .map_err(|_| SessionError::ResponseClosed)
    }

    /// Finish the response. Idempotent.
    pub fn end(&mut self) {
        let _ = self.write_head();
        self.body_tx.take();
    }

    /// Take the one-shot notifier that fires when the client goes away
    pub fn take_close_notifier(&mut self) -> Option<CloseNotifier> {
        self.gone_tx.take().map(CloseNotifier)
    }

    fn write_head(&mut self) -> Result<(), SessionError> {
        if let Some(head_tx) = self.head_tx.take() {
            let head = std::mem::take(&mut self.head);
            head_tx.send(head).map_err(|_| SessionError::ResponseClosed)?;
        }
        Ok(())
    }
}

/// Resolves once the HTTP layer dropped its side of the response
#[derive(Debug)]
pub struct CloseNotifier(oneshot::Sender<()>);

impl CloseNotifier {
    /// Wait until the client side of the response is gone
    pub async fn closed(mut self) {
        self.0.closed().await
    }
}

/// HTTP layer's half of an in-flight response
#[derive(Debug)]
pub struct PendingResponse {
    head_rx: oneshot::Receiver<ResponseHead>,
    body: ResponseBody,
}

impl PendingResponse {
    /// Wait for the head, then hand back the body stream.
    ///
    /// A writer that is dropped without writing anything yields an empty
    /// `200` response.
    pub async fn into_parts(self) -> (ResponseHead, ResponseBody) {
        let head = self.head_rx.await.unwrap_or_default();
        (head, self.body)
    }
}

/// Body chunks of a response, ending when the writer ends
#[derive(Debug)]
pub struct ResponseBody {
    body_rx: mpsc::UnboundedReceiver<Bytes>,
    _gone_rx: oneshot::Receiver<()>,
}

impl ResponseBody {
    /// Receive the next chunk
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.body_rx.recv().await
    }

    /// Collect the remaining body as UTF-8 text
    pub async fn read_to_string(mut self) -> String {
        let mut out = Vec::new();
        while let Some(chunk) = self.body_rx.recv().await {
            out.extend_from_slice(&chunk);
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

impl Stream for ResponseBody {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.body_rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_head_then_body() {
        let (mut writer, pending) = response_channel();
        writer.put_header("Content-Type", "text/plain");
        writer.write("one").unwrap();
        writer.write("two").unwrap();
        writer.end();

        let (head, body) = pending.into_parts().await;
        assert_eq!(head.status, 200);
        assert_eq!(head.header("content-type"), Some("text/plain"));
        assert_eq!(body.read_to_string().await, "onetwo");
    }

    #[tokio::test]
    async fn test_end_without_writes_is_empty_response() {
        let (mut writer, pending) = response_channel();
        writer.end();
        writer.end();

        let (head, body) = pending.into_parts().await;
        assert_eq!(head, ResponseHead::default());
        assert_eq!(body.read_to_string().await, "");
    }

    #[tokio::test]
    async fn test_write_after_client_gone_fails() {
        let (mut writer, pending) = response_channel();
        let notifier = writer.take_close_notifier().unwrap();
        drop(pending);

        notifier.closed().await;
        assert_eq!(writer.write("late"), Err(SessionError::ResponseClosed));
    }

    #[tokio::test]
    async fn test_headers_frozen_after_first_write() {
        let (mut writer, pending) = response_channel();
        writer.put_header("X-First", "1");
        writer.write("x").unwrap();
        writer.put_header("X-Late", "2");
        writer.end();

        let (head, _) = pending.into_parts().await;
        assert_eq!(head.header("X-First"), Some("1"));
        assert_eq!(head.header("X-Late"), None);
    }
}
