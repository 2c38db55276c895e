use axum::{
    extract::{MatchedPath, Request},
    http::{Extensions, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use regex::Regex;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, LazyLock, OnceLock,
    },
    time::Instant,
};
use tracing::{debug, warn};

use super::{error::AppError, request_metadata::RequestContext};

static PROMETHEUS: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

static ROUTE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"/[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}", "/:id"),
        (r"/\d+", "/:id"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Tracks in-flight requests and feeds the HTTP series
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    active_requests: Arc<AtomicU64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register descriptions for every series this service emits
    pub fn initialize_metrics(&self) {
        describe_counter!("http_requests_total", "Total number of HTTP requests processed");
        describe_histogram!(
            "http_request_duration_seconds",
            "Duration of HTTP requests in seconds"
        );
        describe_gauge!("http_active_requests", "Number of currently active HTTP requests");
        describe_counter!("http_errors_total", "Total number of dispatched errors by code");
        describe_counter!("rate_limit_hits_total", "Total number of rate limit breaches");
        describe_counter!("security_events_total", "Total number of security events");

        debug!("Metrics initialized");
    }

    pub fn active_requests(&self) -> u64 {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Record HTTP request start
    pub fn record_request_start(&self, method: &Method, route: String) -> RequestMetrics {
        let active = self.active_requests.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("http_active_requests").set(active as f64);

        RequestMetrics { method: method.clone(), route, start_time: Instant::now() }
    }

    /// Record HTTP request completion
    pub fn record_request_complete(&self, request_metrics: &RequestMetrics, status: StatusCode) {
        let duration = request_metrics.start_time.elapsed();
        let active = self.active_requests.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);

        let labels = [
            ("method", request_metrics.method.to_string()),
            ("route", request_metrics.route.clone()),
            ("status_code", status.as_u16().to_string()),
        ];

        counter!("http_requests_total", &labels).increment(1);
        histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
        gauge!("http_active_requests").set(active as f64);
    }
}

/// Metrics data for a single request
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub method: Method,
    pub route: String,
    pub start_time: Instant,
}

/// Count one dispatched error
pub fn record_error(method: &Method, route: &str, error_code: &str) {
    counter!(
        "http_errors_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "error_code" => error_code.to_string()
    )
    .increment(1);
}

/// Count one rate limit breach
pub fn record_rate_limit_hit(endpoint: &str, ip: &str) {
    counter!("rate_limit_hits_total", "endpoint" => endpoint.to_string(), "ip" => ip.to_string())
        .increment(1);
}

/// Count one security event
pub fn record_security_event(event_type: &str, endpoint: &str) {
    counter!(
        "security_events_total",
        "event_type" => event_type.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}

/// Initialize Prometheus metrics exporter
pub fn initialize_prometheus_exporter() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)?;
    Ok(handle)
}

/// Process-wide exporter handle. The global recorder can be installed once per
/// process, later callers share the first handle.
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS
        .get_or_init(|| match initialize_prometheus_exporter() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Prometheus recorder not installed, metrics endpoint disabled");
                None
            }
        })
        .clone()
}

/// Handler for the scrape endpoint
pub async fn render_metrics() -> Response {
    match prometheus_handle() {
        Some(handle) => handle.render().into_response(),
        None => AppError::service_unavailable()
            .with_message("Metrics exporter is not available")
            .into_response(),
    }
}

/// Metrics middleware for collecting HTTP metrics
pub fn metrics_middleware(
    collector: MetricsCollector,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
+ Clone {
    move |request: Request, next: Next| {
        let collector = collector.clone();
        Box::pin(async move {
            let route = request.extensions().get::<RequestContext>().map_or_else(
                || route_label(request.extensions(), request.uri().path()),
                |context| context.metadata.route.clone(),
            );

            let request_metrics = collector.record_request_start(request.method(), route);
            let response = next.run(request).await;
            collector.record_request_complete(&request_metrics, response.status());

            response
        })
    }
}

/// Route label: the matched template when routing succeeded, otherwise the
/// path with identifier segments collapsed
pub fn route_label(extensions: &Extensions, path: &str) -> String {
    extensions
        .get::<MatchedPath>()
        .map_or_else(|| normalize_route_path(path), |matched| matched.as_str().to_string())
}

/// Normalize route paths for consistent metrics
fn normalize_route_path(path: &str) -> String {
    let mut normalized = path.to_string();

    for (re, replacement) in ROUTE_PATTERNS.iter() {
        normalized = re.replace_all(&normalized, *replacement).to_string();
    }

    if normalized != "/" && normalized.ends_with('/') {
        normalized.pop();
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, response::Json, routing::get, Router};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::json;
    use tower::ServiceExt;

    async fn test_handler() -> Json<serde_json::Value> {
        Json(json!({"message": "test"}))
    }

    #[test]
    fn test_normalize_route_path() {
        assert_eq!(
            normalize_route_path("/api/users/123e4567-e89b-12d3-a456-426614174000"),
            "/api/users/:id"
        );
        assert_eq!(normalize_route_path("/api/users/123/"), "/api/users/:id");
        assert_eq!(normalize_route_path("/api/v2x/orders"), "/api/v2x/orders");
        assert_eq!(normalize_route_path("/"), "/");
    }

    #[test]
    fn test_route_label_prefers_matched_template() {
        assert_eq!(route_label(&Extensions::new(), "/api/users/42"), "/api/users/:id");
    }

    #[tokio::test]
    async fn test_metrics_collector_request_lifecycle() {
        let collector = MetricsCollector::new();

        let request_metrics = collector.record_request_start(&Method::GET, "/test".to_string());
        assert_eq!(collector.active_requests(), 1);
        assert_eq!(request_metrics.route, "/test");

        collector.record_request_complete(&request_metrics, StatusCode::OK);
        assert_eq!(collector.active_requests(), 0);
    }

    #[test]
    fn test_series_are_rendered_with_labels() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_error(&Method::POST, "/api/users", "VAL-001");
            record_rate_limit_hit("/api/auth/login", "203.0.113.1");
            record_security_event("SUSPICIOUS_ACTIVITY", "/api/users");
        });

        let rendered = handle.render();
        assert!(rendered.contains("http_errors_total"));
        assert!(rendered.contains("error_code=\"VAL-001\""));
        assert!(rendered.contains("rate_limit_hits_total"));
        assert!(rendered.contains("event_type=\"SUSPICIOUS_ACTIVITY\""));
    }

    #[tokio::test]
    async fn test_metrics_middleware_uses_matched_route() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let collector = MetricsCollector::new();

        let app = Router::new()
            .route("/items/{id}", get(test_handler))
            .layer(axum::middleware::from_fn(metrics_middleware(collector.clone())));

        let request = Request::builder().uri("/items/7").body(Body::empty()).unwrap();
        let response = {
            let _guard = metrics::set_default_local_recorder(&recorder);
            app.oneshot(request).await.unwrap()
        };

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(collector.active_requests(), 0);
        let rendered = handle.render();
        assert!(rendered.contains("route=\"/items/{id}\""));
        assert!(rendered.contains("status_code=\"200\""));
    }
}
