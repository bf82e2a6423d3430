//! XHR polling and XHR streaming transports.
//!
//! Both receive frames on a `POST` and send messages with `xhr_send`. A
//! polling response carries exactly one frame; a streaming response opens
//! with a 2 KiB prelude and carries frames until its byte budget is spent.

use crate::headers::{
    into_http_response, session_cookie, transport_headers, valid_path_ids, with_headers,
};
use crate::server::TransportState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use sockjs_session::{response_channel, Listener};
use sockjs_wire::PayloadEncoding;
use std::sync::Arc;
use tracing::{debug, warn};

/// Content type of send acknowledgements
pub(crate) const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";

/// `POST <prefix>/<server>/<session>/xhr`
pub async fn xhr_poll(
    State(state): State<Arc<TransportState>>,
    Path((server_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !valid_path_ids(&server_id, &session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }

    debug!("XHR poll for session {}", session_id);
    let (writer, pending) = response_channel();
    let listener = Listener::polling(writer, transport_headers(&state.config, &headers));
    state.attach(&session_id, listener);

    into_http_response(pending).await
}

/// `POST <prefix>/<server>/<session>/xhr_streaming`
pub async fn xhr_streaming(
    State(state): State<Arc<TransportState>>,
    Path((server_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !valid_path_ids(&server_id, &session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }

    debug!("XHR streaming for session {}", session_id);
    let (writer, pending) = response_channel();
    let listener = Listener::streaming(
        writer,
        transport_headers(&state.config, &headers),
        state.config.session.max_bytes_streaming,
    );
    state.attach(&session_id, listener);

    into_http_response(pending).await
}

/// `POST <prefix>/<server>/<session>/xhr_send`: body is a raw JSON array
pub async fn xhr_send(
    State(state): State<Arc<TransportState>>,
    Path((server_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !valid_path_ids(&server_id, &session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let session = match state.send_target(&session_id) {
        Ok(session) => session,
        Err(e) => {
            debug!("XHR send to unknown session {}", session_id);
            let cookie = session_cookie(&state.config, &headers);
            return with_headers(e.into_response(), cookie.into_iter().collect());
        }
    };

    if let Err(e) = state.deliver(&session, &body, PayloadEncoding::Json) {
        warn!("Rejected XHR send for session {}: {}", session_id, e);
        return e.into_response();
    }

    let mut extra = vec![(header::CONTENT_TYPE.to_string(), TEXT_PLAIN.to_string())];
    extra.extend(transport_headers(&state.config, &headers));
    with_headers(StatusCode::NO_CONTENT.into_response(), extra)
}
