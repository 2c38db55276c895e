//! Middleware for HTTP request processing
//!
//! - Request metadata capture and tracing headers
//! - The ordered security pipeline and its stages
//! - Error dispatch into response envelopes
//! - Metrics collection
//! - Access logging

pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;
pub mod request_metadata;
pub mod sanitize;
pub mod security;
pub mod security_log;
pub mod timeout;
pub mod validation;

pub use error::{dispatch_errors, handle_panic, route_not_found, AppError};
pub use logging::{access_log, AccessLogConfig};
pub use metrics::{metrics_middleware, render_metrics, MetricsCollector};
pub use pipeline::{security_pipeline, PipelineStage, SecurityPipeline, StageContext, StageOutcome};
pub use request_metadata::{capture_request_metadata, RequestContext, RequestMetadata};
pub use security_log::{SecurityEvent, SecurityEventType, SecurityEvents};
