use async_trait::async_trait;
use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
    metrics::record_rate_limit_hit,
    pipeline::{PipelineStage, StageContext, StageOutcome},
    request_metadata::RequestMetadata,
    security_log::{SecurityEvent, SecurityEventType, SecurityEvents},
};
use crate::{
    infrastructure::config::{RateLimitRule, RateLimitingConfig},
    presentation::response::ResponseEnvelope,
};

/// Which window a request is counted against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitClass {
    Api,
    Auth,
    PasswordReset,
}

impl RateLimitClass {
    pub fn error_code(self) -> &'static str {
        match self {
            Self::Api => "RATE_LIMIT_EXCEEDED",
            Self::Auth => "AUTH_RATE_LIMIT_EXCEEDED",
            Self::PasswordReset => "PASSWORD_RESET_RATE_LIMIT_EXCEEDED",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Api => "Too many requests from this IP, please try again later.",
            Self::Auth => "Too many authentication attempts, please try again later.",
            Self::PasswordReset => "Too many password reset attempts, please try again later.",
        }
    }
}

/// Outcome of counting one request
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes
    pub reset_after: Duration,
}

impl RateLimitInfo {
    pub fn add_headers(&self, headers: &mut HeaderMap) {
        headers.insert("ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert("ratelimit-reset", HeaderValue::from(ceil_secs(self.reset_after)));

        if !self.allowed {
            headers.insert("retry-after", HeaderValue::from(ceil_secs(self.reset_after)));
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
struct LimiterState {
    windows: HashMap<String, Window>,
    last_sweep: Instant,
}

/// Fixed window counter per client key
#[derive(Debug, Clone)]
pub struct FixedWindowLimiter {
    rule: RateLimitRule,
    state: Arc<RwLock<LimiterState>>,
}

impl FixedWindowLimiter {
    pub fn new(rule: RateLimitRule) -> Self {
        Self {
            rule,
            state: Arc::new(RwLock::new(LimiterState {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            })),
        }
    }

    /// Count one request from `key`
    pub async fn check(&self, key: &str) -> RateLimitInfo {
        let now = Instant::now();
        let window_length = self.rule.window;
        let mut state = self.state.write().await;

        // Expired windows are dropped at most once per window length
        if now.duration_since(state.last_sweep) >= window_length {
            state.windows.retain(|_, window| now.duration_since(window.started) < window_length);
            state.last_sweep = now;
        }

        let window = state
            .windows
            .entry(key.to_string())
            .or_insert(Window { started: now, count: 0 });

        if now.duration_since(window.started) >= window_length {
            *window = Window { started: now, count: 0 };
        }

        window.count = window.count.saturating_add(1);

        RateLimitInfo {
            allowed: window.count <= self.rule.max_requests,
            limit: self.rule.max_requests,
            remaining: self.rule.max_requests.saturating_sub(window.count),
            reset_after: window_length.saturating_sub(now.duration_since(window.started)),
        }
    }

    pub async fn tracked_clients(&self) -> usize {
        self.state.read().await.windows.len()
    }
}

/// Per-IP throttling with stricter windows for authentication and password
/// reset endpoints
#[derive(Debug, Clone)]
pub struct RateLimitStage {
    api: FixedWindowLimiter,
    auth: FixedWindowLimiter,
    password_reset: FixedWindowLimiter,
    auth_paths: Vec<String>,
    password_reset_paths: Vec<String>,
    exempt_paths: Vec<String>,
    trust_proxy: bool,
    events: SecurityEvents,
}

impl RateLimitStage {
    pub fn new(config: &RateLimitingConfig, events: SecurityEvents) -> Self {
        Self {
            api: FixedWindowLimiter::new(config.api),
            auth: FixedWindowLimiter::new(config.auth),
            password_reset: FixedWindowLimiter::new(config.password_reset),
            auth_paths: config.auth_paths.clone(),
            password_reset_paths: config.password_reset_paths.clone(),
            exempt_paths: config.exempt_paths.clone(),
            trust_proxy: config.trust_proxy,
            events,
        }
    }

    /// Counting key. Forwarding headers are client supplied, so they are only
    /// honoured when the deployment says a proxy rewrites them.
    fn client_key<'a>(&self, metadata: &'a RequestMetadata) -> &'a str {
        if self.trust_proxy {
            &metadata.client_ip
        } else {
            metadata.socket_ip.as_deref().unwrap_or("unknown")
        }
    }

    fn matches_any(prefixes: &[String], path: &str) -> bool {
        prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Stricter class for the path, if any. Password reset paths usually sit
    /// under the auth prefix, so they are checked first.
    pub fn classify(&self, path: &str) -> Option<RateLimitClass> {
        if Self::matches_any(&self.password_reset_paths, path) {
            Some(RateLimitClass::PasswordReset)
        } else if Self::matches_any(&self.auth_paths, path) {
            Some(RateLimitClass::Auth)
        } else {
            None
        }
    }

    fn limiter(&self, class: RateLimitClass) -> &FixedWindowLimiter {
        match class {
            RateLimitClass::Api => &self.api,
            RateLimitClass::Auth => &self.auth,
            RateLimitClass::PasswordReset => &self.password_reset,
        }
    }

    fn exceeded(&self, ctx: &StageContext, class: RateLimitClass, info: RateLimitInfo) -> Response {
        let metadata = &ctx.metadata;

        warn!(
            ip = %metadata.client_ip,
            path = %metadata.path,
            error_code = class.error_code(),
            limit = info.limit,
            "Rate limit exceeded"
        );
        record_rate_limit_hit(&metadata.path, &metadata.client_ip);
        self.events.record(
            &SecurityEvent::new(SecurityEventType::RateLimit, "Rate limit exceeded", metadata)
                .with_detail(class.error_code()),
        );

        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ResponseEnvelope::minimal(
                metadata.request_id.clone(),
                class.message(),
                class.error_code(),
            )),
        )
            .into_response();
        info.add_headers(response.headers_mut());
        response
    }
}

#[async_trait]
impl PipelineStage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn inspect(&self, ctx: &mut StageContext) -> StageOutcome {
        let path = ctx.path().to_string();
        if Self::matches_any(&self.exempt_paths, &path) {
            return StageOutcome::Continue;
        }

        let key = self.client_key(&ctx.metadata).to_string();
        let mut reported = None;

        if let Some(class) = self.classify(&path) {
            let info = self.limiter(class).check(&key).await;
            if !info.allowed {
                return StageOutcome::Respond(self.exceeded(ctx, class, info));
            }
            reported = Some(info);
        }

        let info = self.api.check(&key).await;
        if !info.allowed {
            return StageOutcome::Respond(self.exceeded(ctx, RateLimitClass::Api, info));
        }

        let info = reported.unwrap_or(info);
        debug!(ip = %key, remaining = info.remaining, "Rate limit check passed");
        info.add_headers(&mut ctx.response_headers);
        StageOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::{ConnectInfo, Request},
    };
    use std::net::SocketAddr;
    use http_body_util::BodyExt;
    use serde_json::Value;

    fn rule(max_requests: u32, window: Duration) -> RateLimitRule {
        RateLimitRule { window, max_requests }
    }

    fn config(api: u32, auth: u32, reset: u32, window: Duration) -> RateLimitingConfig {
        RateLimitingConfig {
            api: rule(api, window),
            auth: rule(auth, window),
            password_reset: rule(reset, window),
            auth_paths: vec!["/api/auth".to_string()],
            password_reset_paths: vec!["/api/auth/password-reset".to_string()],
            exempt_paths: vec!["/metrics".to_string()],
            trust_proxy: false,
        }
    }

    fn stage(api: u32, auth: u32, reset: u32) -> RateLimitStage {
        RateLimitStage::new(&config(api, auth, reset, Duration::from_secs(900)), SecurityEvents::new(false))
    }

    /// Request arriving from the socket `ip`, claiming `forwarded_for`
    fn forwarded_ctx(path: &str, ip: &str, forwarded_for: &str) -> StageContext {
        let mut request = Request::builder()
            .method("POST")
            .uri(path)
            .header("x-forwarded-for", forwarded_for)
            .body(Body::empty())
            .unwrap();
        let socket: SocketAddr = format!("{ip}:40000").parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(socket));
        StageContext::new(request)
    }

    fn ctx(path: &str, ip: &str) -> StageContext {
        forwarded_ctx(path, ip, ip)
    }

    async fn error_code(outcome: StageOutcome) -> (StatusCode, HeaderMap, Value) {
        let StageOutcome::Respond(response) = outcome else {
            panic!("expected a 429 response");
        };
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_fixed_window_counts_and_resets() {
        let limiter = FixedWindowLimiter::new(rule(2, Duration::from_millis(50)));

        assert!(limiter.check("a").await.allowed);
        let second = limiter.check("a").await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
        assert!(!limiter.check("a").await.allowed);
        assert!(limiter.check("b").await.allowed);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.check("a").await.allowed);
        assert_eq!(limiter.tracked_clients().await, 1);
    }

    #[tokio::test]
    async fn test_sixth_auth_attempt_is_rejected() {
        let stage = stage(1000, 5, 3);

        for _ in 0..5 {
            let outcome = stage.inspect(&mut ctx("/api/auth/login", "203.0.113.5")).await;
            assert!(matches!(outcome, StageOutcome::Continue));
        }

        let (status, headers, body) =
            error_code(stage.inspect(&mut ctx("/api/auth/login", "203.0.113.5")).await).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["errorCode"], "AUTH_RATE_LIMIT_EXCEEDED");
        assert_eq!(body["message"], RateLimitClass::Auth.message());
        assert_eq!(body.as_object().unwrap().len(), 4);
        assert!(headers.get("retry-after").is_some());

        // Another client is unaffected
        let outcome = stage.inspect(&mut ctx("/api/auth/login", "203.0.113.6")).await;
        assert!(matches!(outcome, StageOutcome::Continue));
    }

    #[tokio::test]
    async fn test_password_reset_has_its_own_window() {
        let stage = stage(1000, 5, 3);
        assert_eq!(stage.classify("/api/auth/password-reset/request"), Some(RateLimitClass::PasswordReset));
        assert_eq!(stage.classify("/api/auth/login"), Some(RateLimitClass::Auth));
        assert_eq!(stage.classify("/api/users"), None);

        for _ in 0..3 {
            stage.inspect(&mut ctx("/api/auth/password-reset", "198.51.100.1")).await;
        }
        let (_, _, body) =
            error_code(stage.inspect(&mut ctx("/api/auth/password-reset", "198.51.100.1")).await)
                .await;
        assert_eq!(body["errorCode"], "PASSWORD_RESET_RATE_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_general_limit_and_headers() {
        let stage = stage(2, 5, 3);

        let mut first = ctx("/api/users", "192.0.2.1");
        assert!(matches!(stage.inspect(&mut first).await, StageOutcome::Continue));
        assert_eq!(first.response_headers.get("ratelimit-limit").unwrap(), "2");
        assert_eq!(first.response_headers.get("ratelimit-remaining").unwrap(), "1");
        assert_eq!(first.response_headers.get("ratelimit-reset").unwrap(), "900");

        stage.inspect(&mut ctx("/api/users", "192.0.2.1")).await;
        let (_, _, body) = error_code(stage.inspect(&mut ctx("/api/users", "192.0.2.1")).await).await;
        assert_eq!(body["errorCode"], "RATE_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_exempt_paths_are_never_throttled() {
        let stage = stage(1, 1, 1);
        for _ in 0..5 {
            let mut context = ctx("/metrics", "192.0.2.9");
            assert!(matches!(stage.inspect(&mut context).await, StageOutcome::Continue));
            assert!(context.response_headers.is_empty());
        }
    }

    #[tokio::test]
    async fn test_forwarded_for_does_not_split_one_client() {
        let stage = stage(1000, 5, 3);

        for i in 0..5 {
            let mut context = forwarded_ctx("/api/auth/login", "198.51.100.7", &format!("10.9.9.{i}"));
            assert!(matches!(stage.inspect(&mut context).await, StageOutcome::Continue));
        }

        let outcome =
            stage.inspect(&mut forwarded_ctx("/api/auth/login", "198.51.100.7", "10.9.9.99")).await;
        let (status, _, body) = error_code(outcome).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["errorCode"], "AUTH_RATE_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_trusted_proxy_counts_forwarded_clients() {
        let mut config = config(1000, 1, 1, Duration::from_secs(900));
        config.trust_proxy = true;
        let stage = RateLimitStage::new(&config, SecurityEvents::new(false));

        for i in 0..3 {
            let mut context = forwarded_ctx("/api/auth/login", "10.0.0.1", &format!("203.0.113.{i}"));
            assert!(matches!(stage.inspect(&mut context).await, StageOutcome::Continue));
        }
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
