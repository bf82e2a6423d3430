//! JSONP transport: frames arrive as `callback("<escaped frame>");` script
//! bodies, and messages go up as a form post or a plain-text JSON array.

use crate::error::SendError;
use crate::headers::{
    into_http_response, session_cookie, transport_headers, valid_path_ids, with_headers,
};
use crate::server::TransportState;
use crate::xhr::TEXT_PLAIN;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use sockjs_session::{response_channel, Listener};
use sockjs_wire::PayloadEncoding;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// `GET <prefix>/<server>/<session>/jsonp?c=<callback>`
pub async fn jsonp_poll(
    State(state): State<Arc<TransportState>>,
    Path((server_id, session_id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !valid_path_ids(&server_id, &session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let Some(callback) = params
        .get("callback")
        .or_else(|| params.get("c"))
        .filter(|callback| valid_callback(callback))
    else {
        warn!("JSONP poll for session {} without a usable callback", session_id);
        return SendError::MissingParameter("callback").into_response();
    };

    debug!("JSONP poll for session {}", session_id);
    let (writer, pending) = response_channel();
    let listener = Listener::jsonp(
        writer,
        transport_headers(&state.config, &headers),
        callback.as_str(),
    );
    state.attach(&session_id, listener);

    into_http_response(pending).await
}

/// `POST <prefix>/<server>/<session>/jsonp_send`
pub async fn jsonp_send(
    State(state): State<Arc<TransportState>>,
    Path((server_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !valid_path_ids(&server_id, &session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let cookie: Vec<_> = session_cookie(&state.config, &headers).into_iter().collect();

    let session = match state.send_target(&session_id) {
        Ok(session) => session,
        Err(e) => {
            debug!("JSONP send to unknown session {}", session_id);
            return with_headers(e.into_response(), cookie);
        }
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let encoding = match PayloadEncoding::from_content_type(content_type) {
        Ok(encoding) => encoding,
        Err(e) => {
            warn!("Rejected JSONP send for session {}: {}", session_id, e);
            return SendError::from(e).into_response();
        }
    };

    if let Err(e) = state.deliver(&session, &body, encoding) {
        warn!("Rejected JSONP send for session {}: {}", session_id, e);
        return e.into_response();
    }

    let mut extra = cookie;
    extra.push((header::CONTENT_TYPE.to_string(), TEXT_PLAIN.to_string()));
    with_headers((StatusCode::OK, "ok").into_response(), extra)
}

/// Callbacks are limited to identifier and property-path characters
fn valid_callback(callback: &str) -> bool {
    !callback.is_empty()
        && callback
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
}
