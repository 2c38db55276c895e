use async_trait::async_trait;
use regex::Regex;
use std::{fmt, sync::LazyLock};
use tracing::{error, warn};

use super::{
    metrics::record_security_event,
    pipeline::{PipelineStage, StageContext, StageOutcome},
    request_metadata::RequestMetadata,
};
use crate::{
    infrastructure::config::SecurityMonitoringConfig, presentation::response::format_timestamp,
};

static SUSPICIOUS_USER_AGENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)sqlmap|nikto|nmap|masscan|scanner").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEventType {
    AuthFailure,
    RateLimit,
    InjectionAttempt,
    SuspiciousActivity,
    ValidationFailure,
}

impl SecurityEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthFailure => "AUTH_FAILURE",
            Self::RateLimit => "RATE_LIMIT",
            Self::InjectionAttempt => "INJECTION_ATTEMPT",
            Self::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            Self::ValidationFailure => "VALIDATION_FAILURE",
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something a monitoring system should hear about
#[derive(Debug, Clone)]
pub struct SecurityEvent<'a> {
    pub event_type: SecurityEventType,
    pub message: String,
    pub metadata: &'a RequestMetadata,
    /// Overrides the request path as the reported endpoint
    pub endpoint: Option<&'a str>,
    pub detail: Option<String>,
}

impl<'a> SecurityEvent<'a> {
    pub fn new(
        event_type: SecurityEventType,
        message: impl Into<String>,
        metadata: &'a RequestMetadata,
    ) -> Self {
        Self { event_type, message: message.into(), metadata, endpoint: None, detail: None }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &'a str) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Sink for security events. Counting always happens, logging can be switched off.
#[derive(Debug, Clone, Copy)]
pub struct SecurityEvents {
    log_enabled: bool,
}

impl SecurityEvents {
    pub fn new(log_enabled: bool) -> Self {
        Self { log_enabled }
    }

    pub fn from_config(config: &SecurityMonitoringConfig) -> Self {
        Self::new(config.log_security_events)
    }

    pub fn record(&self, event: &SecurityEvent<'_>) {
        let metadata = event.metadata;
        let endpoint = event.endpoint.unwrap_or(&metadata.path);

        record_security_event(event.event_type.as_str(), endpoint);

        if !self.log_enabled {
            return;
        }

        error!(
            event_type = event.event_type.as_str(),
            request_id = %metadata.request_id,
            ip = %metadata.client_ip,
            endpoint = %endpoint,
            method = %metadata.method,
            user_id = metadata.user_id.as_deref(),
            detail = event.detail.as_deref(),
            timestamp = %format_timestamp(chrono::Utc::now()),
            "SECURITY_EVENT: {}",
            event.message
        );
    }
}

/// Last stage of the pipeline. Only observes.
#[derive(Debug, Clone)]
pub struct SecurityLogStage {
    events: SecurityEvents,
    suspicious_query_length: usize,
}

impl SecurityLogStage {
    pub fn new(config: &SecurityMonitoringConfig) -> Self {
        Self {
            events: SecurityEvents::from_config(config),
            suspicious_query_length: config.suspicious_query_length,
        }
    }
}

pub fn is_suspicious_user_agent(user_agent: &str) -> bool {
    SUSPICIOUS_USER_AGENT.as_ref().is_some_and(|pattern| pattern.is_match(user_agent))
}

#[async_trait]
impl PipelineStage for SecurityLogStage {
    fn name(&self) -> &'static str {
        "security_log"
    }

    async fn inspect(&self, ctx: &mut StageContext) -> StageOutcome {
        let metadata = &ctx.metadata;

        if let Some(user_agent) = metadata.user_agent.as_deref() {
            if is_suspicious_user_agent(user_agent) {
                self.events.record(
                    &SecurityEvent::new(
                        SecurityEventType::SuspiciousActivity,
                        "Suspicious user agent detected",
                        metadata,
                    )
                    .with_detail(user_agent),
                );
            }
        }

        let query_length = ctx.parts.uri.query().map_or(0, str::len);
        if query_length > self.suspicious_query_length {
            warn!(query_length, limit = self.suspicious_query_length, "Unusually large query string");
            self.events.record(&SecurityEvent::new(
                SecurityEventType::SuspiciousActivity,
                "Unusually large query string",
                metadata,
            ));
        }

        StageOutcome::Continue
    }
}
