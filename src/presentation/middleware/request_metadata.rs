use axum::{
    extract::{ConnectInfo, FromRequestParts, OriginalUri, Request, State},
    http::{request::Parts, Extensions, HeaderMap, HeaderValue, Method, Uri},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Instant};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::metrics::route_label;
use crate::infrastructure::config::RuntimeMode;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Authenticated caller, inserted into request extensions by whatever
/// authenticates the request upstream of metadata capture.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: String,
    pub session_id: Option<String>,
}

/// Identifiers and request facts captured once at entry. Read-only afterwards.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    pub request_id: String,
    pub correlation_id: String,
    pub trace_id: String,
    pub request_timestamp: DateTime<Utc>,
    pub method: Method,
    pub path: String,
    pub original_url: String,
    /// Route template when the router matched one, otherwise a normalized path
    pub route: String,
    /// Best-effort client address for logs and envelopes. Forwarding headers
    /// are client supplied, so this is never used as a trust boundary.
    pub client_ip: String,
    /// Address of the connected peer, when the server recorded one
    pub socket_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub query_params: Option<Vec<(String, String)>>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl RequestMetadata {
    fn capture(method: &Method, uri: &Uri, headers: &HeaderMap, extensions: &Extensions) -> Self {
        let original = extensions.get::<OriginalUri>().map_or(uri, |OriginalUri(original)| original);
        let identity = extensions.get::<UserIdentity>();

        let query_params = original.query().and_then(|query| {
            let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            (!pairs.is_empty()).then_some(pairs)
        });

        Self {
            request_id: Uuid::new_v4().to_string(),
            correlation_id: inbound_or_generated(headers, CORRELATION_ID_HEADER),
            trace_id: inbound_or_generated(headers, TRACE_ID_HEADER),
            request_timestamp: Utc::now(),
            method: method.clone(),
            path: original.path().to_string(),
            original_url: original
                .path_and_query()
                .map_or_else(|| original.path().to_string(), ToString::to_string),
            route: route_label(extensions, original.path()),
            client_ip: client_ip(headers, extensions),
            socket_ip: socket_ip(extensions),
            user_agent: header_string(headers, "user-agent"),
            referer: header_string(headers, "referer"),
            content_type: header_string(headers, "content-type"),
            content_length: header_string(headers, "content-length")
                .and_then(|length| length.parse().ok()),
            query_params,
            user_id: identity.map(|identity| identity.user_id.clone()),
            session_id: identity.and_then(|identity| identity.session_id.clone()),
        }
    }

    pub fn from_request(request: &Request) -> Self {
        Self::capture(request.method(), request.uri(), request.headers(), request.extensions())
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::capture(&parts.method, &parts.uri, &parts.headers, &parts.extensions)
    }
}

/// Per-request view handed to handlers, the envelope builder and the error
/// dispatcher.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub metadata: Arc<RequestMetadata>,
    pub started_at: Option<Instant>,
    pub mode: RuntimeMode,
}

impl RequestContext {
    /// Context for a request that never went through capture. There is no
    /// start time and it is treated as production so nothing extra leaks.
    pub fn detached(metadata: RequestMetadata) -> Self {
        Self { metadata: Arc::new(metadata), started_at: None, mode: RuntimeMode::Production }
    }

    pub fn from_request(request: &Request) -> Self {
        request
            .extensions()
            .get::<Self>()
            .cloned()
            .unwrap_or_else(|| Self::detached(RequestMetadata::from_request(request)))
    }

    /// Whole milliseconds since capture, if capture ran
    pub fn processing_time_ms(&self) -> Option<u64> {
        self.started_at.map(|started| started.elapsed().as_millis() as u64)
    }

    pub fn include_debug_metadata(&self) -> bool {
        !self.mode.is_production()
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or_else(|| Self::detached(RequestMetadata::from_parts(parts))))
    }
}

/// Outermost middleware: assigns identifiers, records the start instant and
/// echoes the tracing headers on every response.
pub async fn capture_request_metadata(
    State(mode): State<RuntimeMode>,
    mut request: Request,
    next: Next,
) -> Response {
    let started_at = Instant::now();
    let metadata = Arc::new(RequestMetadata::from_request(&request));

    request.extensions_mut().insert(RequestContext {
        metadata: Arc::clone(&metadata),
        started_at: Some(started_at),
        mode,
    });

    let span = info_span!(
        "request",
        request_id = %metadata.request_id,
        correlation_id = %metadata.correlation_id,
        trace_id = %metadata.trace_id,
        method = %metadata.method,
        path = %metadata.path,
    );

    let mut response = next.run(request).instrument(span).await;
    echo_tracing_headers(response.headers_mut(), &metadata);
    response
}

fn echo_tracing_headers(headers: &mut HeaderMap, metadata: &RequestMetadata) {
    for (name, value) in [
        (REQUEST_ID_HEADER, &metadata.request_id),
        (CORRELATION_ID_HEADER, &metadata.correlation_id),
        (TRACE_ID_HEADER, &metadata.trace_id),
    ] {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    }
}

fn inbound_or_generated(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from)
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(String::from)
}

/// Client IP from `X-Forwarded-For` (first entry), then `X-Real-IP`, then the
/// socket address, else `"unknown"`
fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    if let Some(first) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
    {
        return first.to_string();
    }

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return real_ip.to_string();
    }

    socket_ip(extensions).unwrap_or_else(|| "unknown".to_string())
}

fn socket_ip(extensions: &Extensions) -> Option<String> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(socket_addr)| socket_addr.ip().to_string())
}
