use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
};
use tracing::{error, info, warn};

use crate::infrastructure::config::{AppConfig, CorsConfig};
use crate::presentation::{
    handlers::AppState,
    middleware::{
        access_log, capture_request_metadata, dispatch_errors, handle_panic, metrics_middleware,
        render_metrics,
        request_metadata::{CORRELATION_ID_HEADER, REQUEST_ID_HEADER, TRACE_ID_HEADER},
        route_not_found, security_pipeline, AccessLogConfig, MetricsCollector, SecurityPipeline,
    },
    routes,
};

/// Create the main application router
pub fn create_app(config: AppConfig) -> Router {
    create_app_with_state(AppState::new(config))
}

/// Middleware order, outermost first: metadata capture, CORS, metrics, access
/// log, error dispatch, panic capture, then the security pipeline right in
/// front of the handlers.
pub fn create_app_with_state(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let collector = MetricsCollector::new();
    collector.initialize_metrics();

    let pipeline = Arc::new(SecurityPipeline::from_config(&config));
    info!(stages = ?pipeline.stage_names(), "Security pipeline assembled");

    let middleware_stack = ServiceBuilder::new()
        .layer(from_fn_with_state(config.mode, capture_request_metadata))
        .layer(create_cors_layer(&config.cors))
        .layer(from_fn(metrics_middleware(collector)))
        .layer(from_fn(access_log(AccessLogConfig::for_mode(config.mode))))
        .layer(from_fn(dispatch_errors))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(DefaultBodyLimit::max(config.limits.json_body_limit))
        .layer(from_fn_with_state(pipeline, security_pipeline));

    Router::new()
        .route(&config.metrics.path, get(render_metrics))
        .merge(routes::create_routes(state))
        .fallback(route_not_found)
        .layer(middleware_stack)
}

/// CORS from configuration. Credentials are allowed, so origins are always an
/// explicit list.
fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let tracing_headers = [
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderName::from_static(CORRELATION_ID_HEADER),
        HeaderName::from_static(TRACE_ID_HEADER),
    ];

    let mut allowed_headers =
        vec![header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT, header::ORIGIN];
    allowed_headers.extend(tracing_headers.iter().cloned());

    let mut exposed_headers = tracing_headers.to_vec();
    exposed_headers.extend([
        HeaderName::from_static("ratelimit-limit"),
        HeaderName::from_static("ratelimit-remaining"),
        HeaderName::from_static("ratelimit-reset"),
    ]);

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(allowed_headers)
        .expose_headers(exposed_headers)
        .max_age(config.max_age)
}

/// Start the HTTP server
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails
pub async fn start_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.server.socket_addr();
    let service_name = config.server.service_name.clone();
    let app = create_app(config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, service = %service_name, "Server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = ?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::RuntimeMode;
    use axum::{body::Body, extract::Request, http::StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check_route() {
        let app = create_app(AppConfig::defaults_for(RuntimeMode::Test));
        let response = app
            .oneshot(Request::builder().uri("/api/api-health-check/verify").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-request-id").is_some());
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");

        let body = json_body(response).await;
        assert_eq!(body["routeCode"], "API-001-SUC");
        assert_eq!(body["data"]["status"], "healthy");
        assert_eq!(body["data"]["service"], "APP_SERVICE");
    }

    #[tokio::test]
    async fn test_unknown_route_gets_not_found_envelope() {
        let app = create_app(AppConfig::defaults_for(RuntimeMode::Test));
        let response = app
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["errorCode"], "NF-002");
        assert_eq!(body["endpoint"], "/api/nope");
    }

    #[test]
    fn test_cors_layer_skips_invalid_origins() {
        let config = CorsConfig {
            allowed_origins: vec!["https://ok.example.com".to_string(), "bad\norigin".to_string()],
            max_age: Duration::from_secs(60),
        };
        // Building must not panic with credentials enabled
        let _layer = create_cors_layer(&config);
    }

    #[tokio::test]
    async fn test_cors_preflight_for_allowed_origin() {
        let app = create_app(AppConfig::defaults_for(RuntimeMode::Development));
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/users")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );
        assert_eq!(response.headers().get("access-control-allow-credentials").unwrap(), "true");
    }
}
