use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::{json, Map, Value};
use std::{future::Future, pin::Pin, time::Duration};
use tracing::{error, info, warn};

use super::request_metadata::RequestContext;
use crate::infrastructure::config::RuntimeMode;

pub const FILTERED: &str = "[FILTERED]";

/// Body fields never written to the log
const SENSITIVE_FIELDS: [&str; 4] = ["password", "access_token", "refresh_token", "id_token"];

/// Access log settings
#[derive(Debug, Clone)]
pub struct AccessLogConfig {
    pub log_request_body: bool,
    /// Bodies larger than this are never buffered for logging
    pub max_body_size: usize,
    pub log_request_headers: bool,
    /// Headers left out of the log
    pub excluded_headers: Vec<String>,
    pub slow_request_threshold: Duration,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl AccessLogConfig {
    pub fn development() -> Self {
        Self {
            log_request_body: true,
            max_body_size: 10_000,
            log_request_headers: true,
            excluded_headers: vec![
                "authorization".to_string(),
                "cookie".to_string(),
                "set-cookie".to_string(),
            ],
            slow_request_threshold: Duration::from_millis(500),
        }
    }

    pub fn production() -> Self {
        Self {
            log_request_body: false,
            max_body_size: 0,
            log_request_headers: false,
            excluded_headers: vec![
                "authorization".to_string(),
                "cookie".to_string(),
                "set-cookie".to_string(),
                "x-api-key".to_string(),
                "x-auth-token".to_string(),
            ],
            slow_request_threshold: Duration::from_secs(2),
        }
    }

    pub fn for_mode(mode: RuntimeMode) -> Self {
        if mode.is_production() {
            Self::production()
        } else {
            Self::development()
        }
    }

    fn should_log_header(&self, name: &str) -> bool {
        !self.excluded_headers.iter().any(|excluded| excluded.eq_ignore_ascii_case(name))
    }

    fn filter_headers(&self, headers: &HeaderMap) -> Value {
        let filtered: Map<String, Value> = headers
            .iter()
            .filter(|(name, _)| self.should_log_header(name.as_str()))
            .map(|(name, value)| {
                (name.as_str().to_string(), json!(value.to_str().unwrap_or("<binary>")))
            })
            .collect();
        Value::Object(filtered)
    }

    /// Only small textual bodies with a declared length are buffered
    fn should_capture_body(&self, headers: &HeaderMap) -> bool {
        if !self.log_request_body {
            return false;
        }

        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());

        let textual = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|content_type| {
                let content_type = content_type.to_ascii_lowercase();
                content_type.contains("json") || content_type.contains("x-www-form-urlencoded")
            });

        textual && declared.is_some_and(|length| length > 0 && length <= self.max_body_size)
    }
}

/// Replace sensitive values wherever they appear in a JSON document
pub fn redact_sensitive(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if SENSITIVE_FIELDS.iter().any(|field| field.eq_ignore_ascii_case(key)) {
                    *value = json!(FILTERED);
                } else {
                    redact_sensitive(value);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_sensitive),
        _ => {}
    }
}

fn format_body(body: &[u8], form: bool) -> Value {
    if form {
        let pairs: Map<String, Value> = url::form_urlencoded::parse(body)
            .map(|(key, value)| {
                let value = if SENSITIVE_FIELDS.iter().any(|field| field.eq_ignore_ascii_case(&key)) {
                    FILTERED.to_string()
                } else {
                    value.into_owned()
                };
                (key.into_owned(), json!(value))
            })
            .collect();
        return Value::Object(pairs);
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(mut value) => {
            redact_sensitive(&mut value);
            value
        }
        Err(_) => json!({ "size": body.len(), "content": "<unparseable>" }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Info,
    Warn,
    Error,
}

fn severity(status: StatusCode, elapsed: Duration, slow_threshold: Duration) -> Severity {
    if status.is_server_error() {
        Severity::Error
    } else if status.is_client_error() || elapsed > slow_threshold {
        Severity::Warn
    } else {
        Severity::Info
    }
}

/// Access log middleware: one event on the way in, one on the way out
pub fn access_log(
    config: AccessLogConfig,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    move |request: Request, next: Next| {
        let config = config.clone();
        Box::pin(async move {
            let context = RequestContext::from_request(&request);
            let metadata = &context.metadata;

            let headers = config
                .log_request_headers
                .then(|| config.filter_headers(request.headers()));

            let (request, body) = if config.should_capture_body(request.headers()) {
                let form = request
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .is_some_and(|value| value.contains("x-www-form-urlencoded"));
                let (parts, body) = request.into_parts();
                match to_bytes(body, config.max_body_size).await {
                    Ok(bytes) => {
                        let logged = format_body(&bytes, form);
                        (Request::from_parts(parts, Body::from(bytes)), Some(logged))
                    }
                    // Declared length lied; the handler sees an empty body
                    Err(_) => (Request::from_parts(parts, Body::empty()), None),
                }
            } else {
                (request, None)
            };

            let headers = headers.map(|headers| headers.to_string());
            let body = body.map(|body| body.to_string());

            info!(
                target: "http_requests",
                request_id = %metadata.request_id,
                method = %metadata.method,
                uri = %metadata.original_url,
                client_ip = %metadata.client_ip,
                user_agent = metadata.user_agent.as_deref(),
                headers = headers.as_deref(),
                body = body.as_deref(),
                "Request received"
            );

            let response = next.run(request).await;

            let status = response.status();
            let elapsed = context.started_at.map_or(Duration::ZERO, |started| started.elapsed());
            let duration_ms = elapsed.as_millis() as u64;

            match severity(status, elapsed, config.slow_request_threshold) {
                Severity::Error => error!(
                    target: "http_responses",
                    request_id = %metadata.request_id,
                    method = %metadata.method,
                    uri = %metadata.original_url,
                    status = status.as_u16(),
                    duration_ms,
                    client_ip = %metadata.client_ip,
                    "Request failed"
                ),
                Severity::Warn => warn!(
                    target: "http_responses",
                    request_id = %metadata.request_id,
                    method = %metadata.method,
                    uri = %metadata.original_url,
                    status = status.as_u16(),
                    duration_ms,
                    client_ip = %metadata.client_ip,
                    slow = elapsed > config.slow_request_threshold,
                    "Request completed with warnings"
                ),
                Severity::Info => info!(
                    target: "http_responses",
                    request_id = %metadata.request_id,
                    method = %metadata.method,
                    uri = %metadata.original_url,
                    status = status.as_u16(),
                    duration_ms,
                    client_ip = %metadata.client_ip,
                    "Request completed"
                ),
            }

            response
        })
    }
}
