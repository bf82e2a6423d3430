//! Header helpers shared by the transports: session-affinity cookie, the
//! XHR CORS policy and its preflight extras, and conversion of a pending
//! listener response into an axum response.

use crate::server::{TransportConfig, TransportState};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use futures::StreamExt;
use sockjs_session::PendingResponse;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::warn;

/// Cookie name used for load-balancer session affinity
pub const JSESSIONID: &str = "JSESSIONID";

const ONE_YEAR_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Header name/value pairs to add to a response
pub type HeaderList = Vec<(String, String)>;

/// `Set-Cookie` echoing the client's JSESSIONID, or `dummy` when it has none
pub fn session_cookie(config: &TransportConfig, request: &HeaderMap) -> Option<(String, String)> {
    if !config.insert_jsessionid {
        return None;
    }

    let value = request
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == JSESSIONID)
        .map(|(_, value)| value.to_string())
        .unwrap_or_else(|| "dummy".to_string());

    Some((
        "Set-Cookie".to_string(),
        format!("{}={}; path=/", JSESSIONID, value),
    ))
}

/// CORS policy of the XHR transports: the request's `Origin` and requested
/// headers are mirrored, credentials are allowed, and preflights are
/// cacheable for a year. No `Access-Control-Allow-Origin` is sent when the
/// request has no `Origin`.
pub fn xhr_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_methods([Method::OPTIONS, Method::POST])
        .max_age(Duration::from_secs(ONE_YEAR_SECONDS as u64))
}

/// Turns the CORS layer's preflight answer into a cacheable `204` that
/// also carries the session cookie. Other requests pass through untouched.
pub async fn preflight_extras(
    State(state): State<Arc<TransportState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    let cookie = session_cookie(&state.config, request.headers());
    let mut response = next.run(request).await;
    *response.status_mut() = StatusCode::NO_CONTENT;

    let expires = chrono::Utc::now() + chrono::Duration::seconds(ONE_YEAR_SECONDS);
    let mut headers: HeaderList = vec![
        (
            "Cache-Control".to_string(),
            format!("public, max-age={}", ONE_YEAR_SECONDS),
        ),
        (
            "Expires".to_string(),
            expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        ),
    ];
    headers.extend(cookie);
    with_headers(response, headers)
}

/// Headers every transport response carries: currently just the cookie
pub fn transport_headers(config: &TransportConfig, request: &HeaderMap) -> HeaderList {
    session_cookie(config, request).into_iter().collect()
}

/// Append `headers` to `response`, skipping any that are not valid HTTP
pub fn with_headers(mut response: Response, headers: HeaderList) -> Response {
    for (name, value) in headers {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => warn!("Dropping invalid response header"),
        }
    }
    response
}

/// Wait for the listener to write its head, then stream its body
pub async fn into_http_response(pending: PendingResponse) -> Response {
    let (head, body) = pending.into_parts().await;

    let mut response = Response::new(Body::from_stream(body.map(Ok::<_, Infallible>)));
    *response.status_mut() = StatusCode::from_u16(head.status).unwrap_or(StatusCode::OK);
    with_headers(response, head.headers)
}

/// Server and session ids are single non-empty segments without dots
pub fn valid_path_ids(server_id: &str, session_id: &str) -> bool {
    [server_id, session_id]
        .iter()
        .all(|segment| !segment.is_empty() && !segment.contains('.'))
}
