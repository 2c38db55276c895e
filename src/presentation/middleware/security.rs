use async_trait::async_trait;
use axum::{
    http::{header, HeaderMap, HeaderValue},
    response::Response,
};

use super::pipeline::{PipelineStage, StageContext, StageOutcome};
use crate::infrastructure::config::RuntimeMode;

const DEFAULT_CSP: &str = "default-src 'self'; style-src 'self' 'unsafe-inline'; script-src 'self'; img-src 'self' data: https:; connect-src 'self'; font-src 'self'; object-src 'none'; media-src 'self'; frame-src 'none'";
const DEFAULT_PERMISSIONS: &str = "accelerometer=(), camera=(), geolocation=(), gyroscope=(), magnetometer=(), microphone=(), payment=(), usb=()";

/// Security headers configuration
#[derive(Debug, Clone)]
pub struct SecurityHeadersConfig {
    /// HSTS max age in seconds. `None` disables the header.
    pub hsts_max_age: Option<u64>,
    pub hsts_preload: bool,
    pub csp_policy: Option<String>,
    pub permissions_policy: Option<String>,
    /// Send `Cache-Control: no-store` and friends
    pub no_store: bool,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            hsts_max_age: Some(31_536_000), // 1 year
            hsts_preload: true,
            csp_policy: Some(DEFAULT_CSP.to_string()),
            permissions_policy: Some(DEFAULT_PERMISSIONS.to_string()),
            no_store: true,
        }
    }
}

impl SecurityHeadersConfig {
    /// HSTS is only sent in production
    pub fn for_mode(mode: RuntimeMode) -> Self {
        if mode.is_production() {
            Self::default()
        } else {
            Self { hsts_max_age: None, ..Self::default() }
        }
    }
}

/// First stage of the pipeline. Never rejects; decorates every response that
/// leaves through it, including rejections from later stages.
#[derive(Debug, Clone)]
pub struct SecurityHeadersStage {
    config: SecurityHeadersConfig,
}

impl SecurityHeadersStage {
    pub fn new(config: SecurityHeadersConfig) -> Self {
        Self { config }
    }

    pub fn for_mode(mode: RuntimeMode) -> Self {
        Self::new(SecurityHeadersConfig::for_mode(mode))
    }
}

#[async_trait]
impl PipelineStage for SecurityHeadersStage {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    async fn inspect(&self, _ctx: &mut StageContext) -> StageOutcome {
        StageOutcome::Continue
    }

    fn finish(&self, response: &mut Response) {
        apply_security_headers(response.headers_mut(), &self.config);
    }
}

/// Apply security headers to response headers
fn apply_security_headers(headers: &mut HeaderMap, config: &SecurityHeadersConfig) {
    // HSTS Header
    if let Some(max_age) = config.hsts_max_age {
        let mut hsts_value = format!("max-age={max_age}; includeSubDomains");
        if config.hsts_preload {
            hsts_value.push_str("; preload");
        }
        if let Ok(header_value) = HeaderValue::from_str(&hsts_value) {
            headers.insert(header::STRICT_TRANSPORT_SECURITY, header_value);
        }
    }

    if let Some(csp) = &config.csp_policy {
        if let Ok(header_value) = HeaderValue::from_str(csp) {
            headers.insert(header::CONTENT_SECURITY_POLICY, header_value);
        }
    }

    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-xss-protection", HeaderValue::from_static("1; mode=block"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));

    if let Some(permissions) = &config.permissions_policy {
        if let Ok(header_value) = HeaderValue::from_str(permissions) {
            headers.insert("permissions-policy", header_value);
        }
    }

    headers.insert("x-permitted-cross-domain-policies", HeaderValue::from_static("none"));
    headers.insert("cross-origin-opener-policy", HeaderValue::from_static("same-origin"));
    headers.insert("cross-origin-resource-policy", HeaderValue::from_static("same-origin"));

    // Responses carry per-request data
    if config.no_store {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }
}
