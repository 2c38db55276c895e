use axum::{extract::State, response::Response};
use serde_json::json;

use super::AppState;
use crate::{
    application::server_metadata::ServerMetadata,
    domain::route_codes::names,
    presentation::{middleware::request_metadata::RequestContext, response::route_success},
};

/// `GET /api/api-health-check/verify`
pub async fn verify(State(state): State<AppState>, context: RequestContext) -> Response {
    let server = ServerMetadata::collect(state.config.mode, state.started_at).await;
    let metadata = &context.metadata;

    let data = server.merge(Some(json!({
        "status": "healthy",
        "service": state.config.server.service_name,
        "request": {
            "method": metadata.method.as_str(),
            "path": metadata.path,
            "ip": metadata.client_ip,
            "userAgent": metadata.user_agent,
            "correlationId": metadata.correlation_id,
            "traceId": metadata.trace_id,
        },
    })));

    route_success(&state.route_codes, names::API_HEALTH_CHECK, "VERIFY_SUCCESS", Some(data), None)
        .send(&context)
}
