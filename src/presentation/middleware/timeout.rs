use async_trait::async_trait;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Duration;
use tracing::warn;

use super::{
    pipeline::{PipelineStage, StageContext, StageOutcome},
    request_metadata::RequestMetadata,
};
use crate::presentation::response::ResponseEnvelope;

pub const TIMEOUT_MESSAGE: &str = "Request timeout";
pub const TIMEOUT_ERROR_CODE: &str = "REQUEST_TIMEOUT";

/// Bounds everything after it, the handler included. When the deadline passes
/// the pending work is dropped and a single 408 goes out in its place.
#[derive(Debug, Clone, Copy)]
pub struct RequestTimeoutStage {
    timeout: Duration,
}

impl RequestTimeoutStage {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl PipelineStage for RequestTimeoutStage {
    fn name(&self) -> &'static str {
        "request_timeout"
    }

    async fn inspect(&self, _ctx: &mut StageContext) -> StageOutcome {
        StageOutcome::Continue
    }

    fn deadline(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    fn on_deadline(&self, metadata: &RequestMetadata) -> Response {
        warn!(
            request_id = %metadata.request_id,
            method = %metadata.method,
            path = %metadata.path,
            timeout_ms = self.timeout.as_millis() as u64,
            "Request timed out"
        );

        (
            StatusCode::REQUEST_TIMEOUT,
            Json(ResponseEnvelope::minimal(
                metadata.request_id.clone(),
                TIMEOUT_MESSAGE,
                TIMEOUT_ERROR_CODE,
            )),
        )
            .into_response()
    }
}
