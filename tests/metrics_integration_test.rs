/// Integration tests for the Prometheus scrape endpoint
mod common;

use api_service::{
    infrastructure::config::RuntimeMode, presentation::middleware::metrics::prometheus_handle,
};
use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn test_metrics_endpoint_exposes_http_series() {
    // The recorder must exist before the requests it should count
    assert!(prometheus_handle().is_some());

    let app = TestApp::for_mode(RuntimeMode::Test);
    app.get("/api/users").await.assert_status(StatusCode::OK);
    app.get("/api/users/12345").await.assert_status(StatusCode::NOT_FOUND);

    let response = app.get("/metrics").await;
    response.assert_status(StatusCode::OK);

    let body = &response.body;
    assert!(body.contains("http_requests_total"));
    assert!(body.contains("http_request_duration_seconds"));
    assert!(body.contains(r#"route="/api/users/{id}""#));
    assert!(body.contains(r#"status_code="404""#));
}

#[tokio::test]
async fn test_route_coded_errors_are_counted() {
    assert!(prometheus_handle().is_some());

    let app = TestApp::for_mode(RuntimeMode::Test);
    let response =
        app.post_json("/api/users", &json!({"name": "John", "email": "john@example.com"})).await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json()["routeCode"], "USR-011-ERR");

    let metrics = app.get("/metrics").await;
    assert!(metrics
        .body
        .lines()
        .any(|line| line.starts_with("http_errors_total") && line.contains(r#"error_code="BL-003""#)));
}

#[tokio::test]
async fn test_metrics_endpoint_skips_the_envelope() {
    assert!(prometheus_handle().is_some());

    let app = TestApp::for_mode(RuntimeMode::Test);
    let response = app.get("/metrics").await;

    response.assert_status(StatusCode::OK);
    assert!(serde_json::from_str::<serde_json::Value>(&response.body).is_err());
    assert!(response.header("x-request-id").is_some());
}
