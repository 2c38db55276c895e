use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::presentation::middleware::request_metadata::RequestContext;

/// UTC, millisecond precision, `Z` suffix
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Caller details echoed back outside production
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DebugMetadata {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// The JSON body of every response the service writes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub message: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_code: Option<String>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DebugMetadata>,
}

impl ResponseEnvelope {
    /// Full envelope for the request behind `context`. The response timestamp
    /// and processing time are taken at the moment of the call.
    pub fn build(
        context: &RequestContext,
        message: Value,
        data: Option<Value>,
        error_code: Option<String>,
        route_code: Option<String>,
    ) -> Self {
        let metadata = &context.metadata;

        Self {
            request_id: metadata.request_id.clone(),
            correlation_id: Some(metadata.correlation_id.clone()),
            trace_id: Some(metadata.trace_id.clone()),
            message,
            data,
            error_code,
            route_code,
            timestamp: format_timestamp(Utc::now()),
            request_timestamp: Some(format_timestamp(metadata.request_timestamp)),
            processing_time: context.processing_time_ms(),
            endpoint: Some(metadata.path.clone()),
            method: Some(metadata.method.to_string()),
            metadata: context.include_debug_metadata().then(|| DebugMetadata {
                ip: metadata.client_ip.clone(),
                user_agent: metadata.user_agent.clone(),
                user_id: metadata.user_id.clone(),
            }),
        }
    }

    /// `{requestId, message, errorCode, timestamp}` only
    pub fn minimal(
        request_id: impl Into<String>,
        message: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            correlation_id: None,
            trace_id: None,
            message: Value::String(message.into()),
            data: None,
            error_code: Some(error_code.into()),
            route_code: None,
            timestamp: format_timestamp(Utc::now()),
            request_timestamp: None,
            processing_time: None,
            endpoint: None,
            method: None,
            metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        infrastructure::config::RuntimeMode,
        presentation::middleware::request_metadata::RequestMetadata,
    };
    use axum::{body::Body, extract::Request};
    use chrono::TimeZone;
    use regex::Regex;
    use serde_json::json;
    use std::time::Instant;

    fn context(mode: RuntimeMode, started: bool) -> RequestContext {
        let request = Request::builder()
            .method("POST")
            .uri("/api/users?x=1")
            .header("user-agent", "test-agent")
            .header("x-real-ip", "198.51.100.7")
            .body(Body::empty())
            .unwrap();
        let mut context = RequestContext::detached(RequestMetadata::from_request(&request));
        context.mode = mode;
        context.started_at = started.then(Instant::now);
        context
    }

    #[test]
    fn test_format_timestamp_is_millis_utc() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_timestamp(at), "2024-03-09T07:05:01.000Z");
    }

    #[test]
    fn test_build_carries_tracing_fields() {
        let ctx = context(RuntimeMode::Development, true);
        let envelope =
            ResponseEnvelope::build(&ctx, json!("ok"), Some(json!({"id": 1})), None, None);
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["requestId"], ctx.metadata.request_id.as_str());
        assert_eq!(value["correlationId"], ctx.metadata.correlation_id.as_str());
        assert_eq!(value["endpoint"], "/api/users");
        assert_eq!(value["method"], "POST");
        assert_eq!(value["data"]["id"], 1);
        assert!(value["processingTime"].as_u64().is_some());
        assert!(value.get("errorCode").is_none());

        let pattern = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z$").unwrap();
        assert!(pattern.is_match(value["timestamp"].as_str().unwrap()));
        assert!(pattern.is_match(value["requestTimestamp"].as_str().unwrap()));
    }

    #[test]
    fn test_debug_metadata_only_outside_production() {
        let dev = ResponseEnvelope::build(
            &context(RuntimeMode::Development, true),
            json!("ok"),
            None,
            None,
            None,
        );
        let metadata = dev.metadata.unwrap();
        assert_eq!(metadata.ip, "198.51.100.7");
        assert_eq!(metadata.user_agent.as_deref(), Some("test-agent"));

        let prod = ResponseEnvelope::build(
            &context(RuntimeMode::Production, true),
            json!("ok"),
            None,
            None,
            None,
        );
        assert!(prod.metadata.is_none());
    }

    #[test]
    fn test_processing_time_omitted_without_start() {
        let envelope = ResponseEnvelope::build(
            &context(RuntimeMode::Development, false),
            json!("ok"),
            None,
            None,
            None,
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value.get("processingTime").is_none());
    }

    #[test]
    fn test_minimal_has_exactly_four_fields() {
        let value = serde_json::to_value(ResponseEnvelope::minimal(
            "req-1",
            "Request timeout",
            "REQUEST_TIMEOUT",
        ))
        .unwrap();

        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert_eq!(value["requestId"], "req-1");
        assert_eq!(value["message"], "Request timeout");
        assert_eq!(value["errorCode"], "REQUEST_TIMEOUT");
        assert!(object.contains_key("timestamp"));
    }
}
