use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use std::{any::Any, error::Error as StdError, sync::Arc};
use thiserror::Error;
use tracing::{error, warn};

use super::{metrics::record_error, request_metadata::RequestContext};
use crate::{
    domain::errors::{ErrorCategory, ErrorCode},
    presentation::response::{format_timestamp, ApiResponse},
};

/// Message substituted for non-operational errors in production
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong.";

/// Upper bound on how much of a framework error body is read back
const FRAMEWORK_BODY_LIMIT: usize = 16 * 1024;

/// Application error carrying a stable code. The HTTP status is always derived
/// from the category.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_operational: bool,
    /// Route-specific code echoed as `routeCode` next to the system code
    pub route_code: Option<String>,
    #[source]
    cause: Option<Arc<dyn StdError + Send + Sync>>,
}

impl AppError {
    pub fn new(code: ErrorCode, category: ErrorCategory) -> Self {
        Self {
            code,
            category,
            message: code.default_message().to_string(),
            timestamp: Utc::now(),
            is_operational: category.is_operational_by_default(),
            route_code: None,
            cause: None,
        }
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalServerError, ErrorCategory::Internal)
    }

    pub fn validation() -> Self {
        Self::new(ErrorCode::ValidationError, ErrorCategory::Validation)
    }

    pub fn bad_request() -> Self {
        Self::new(ErrorCode::ValidationError, ErrorCategory::BadRequest)
    }

    pub fn authentication() -> Self {
        Self::new(ErrorCode::AuthenticationError, ErrorCategory::Authentication)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::AuthenticationRequired, ErrorCategory::Unauthorized)
    }

    pub fn authorization() -> Self {
        Self::new(ErrorCode::AuthorizationError, ErrorCategory::Authorization)
    }

    pub fn forbidden() -> Self {
        Self::new(ErrorCode::AccessDenied, ErrorCategory::Forbidden)
    }

    pub fn database() -> Self {
        Self::new(ErrorCode::DatabaseError, ErrorCategory::Database)
    }

    pub fn external() -> Self {
        Self::new(ErrorCode::ExternalServiceError, ErrorCategory::External)
    }

    pub fn not_found() -> Self {
        Self::new(ErrorCode::RequestedResourceNotFound, ErrorCategory::NotFound)
    }

    pub fn business_logic() -> Self {
        Self::new(ErrorCode::BusinessLogicError, ErrorCategory::BusinessLogic)
    }

    pub fn conflict() -> Self {
        Self::new(ErrorCode::DuplicateEntry, ErrorCategory::Conflict)
    }

    pub fn system() -> Self {
        Self::new(ErrorCode::SystemError, ErrorCategory::System)
    }

    pub fn payload_too_large() -> Self {
        Self::new(ErrorCode::FieldLengthExceeded, ErrorCategory::PayloadTooLarge)
    }

    pub fn service_unavailable() -> Self {
        Self::new(ErrorCode::ServiceUnavailable, ErrorCategory::ServiceUnavailable)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCode::RequestTimeout, ErrorCategory::Timeout)
    }

    /// Wrap an error nobody anticipated. It is reported as a non-operational
    /// internal error and keeps the source chain for diagnostics.
    pub fn unexpected<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut app_error = Self::internal().with_message(err.to_string());
        app_error.is_operational = false;
        app_error.cause = Some(Arc::new(err));
        app_error
    }

    /// Error for a handler that panicked
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());

        let mut app_error = Self::internal().with_message(format!("Unhandled panic: {detail}"));
        app_error.is_operational = false;
        app_error
    }

    /// Replace the code. A message still at the old code's default follows the
    /// new code.
    #[must_use]
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        if self.message == self.code.default_message() {
            self.message = code.default_message().to_string();
        }
        self.code = code;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn with_route_code(mut self, route_code: impl Into<String>) -> Self {
        self.route_code = Some(route_code.into());
        self
    }

    #[must_use]
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.category.status_code()
    }

    /// Get the error type for logging
    pub fn error_type(&self) -> &'static str {
        self.category.as_str()
    }

    /// Server faults and anything non-operational are logged at error level
    pub fn should_log_as_error(&self) -> bool {
        !self.is_operational || self.status_code().is_server_error()
    }

    /// Messages of this error and every source below it, outermost first
    pub fn cause_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.source();
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

/// The response only carries the status and the error itself. `dispatch_errors`
/// renders the envelope once the request context is at hand.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = self.status_code().into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request()
            .with_code(ErrorCode::InvalidInputFormat)
            .with_message(format!("Invalid JSON: {err}"))
            .with_cause(err)
    }
}

/// Render `error` into its envelope, logging it and counting it
pub fn dispatch(error: &AppError, context: &RequestContext) -> Response {
    let metadata = &context.metadata;
    let production = context.mode.is_production();

    let message = if production && !error.is_operational {
        GENERIC_ERROR_MESSAGE.to_string()
    } else {
        error.message.clone()
    };

    let causes = if production { Vec::new() } else { error.cause_chain() };

    if error.should_log_as_error() {
        error!(
            error_code = error.code.as_str(),
            route_code = error.route_code.as_deref(),
            category = error.error_type(),
            request_id = %metadata.request_id,
            correlation_id = %metadata.correlation_id,
            trace_id = %metadata.trace_id,
            endpoint = %metadata.path,
            method = %metadata.method,
            ip = %metadata.client_ip,
            user_agent = metadata.user_agent.as_deref(),
            user_id = metadata.user_id.as_deref(),
            timestamp = %format_timestamp(error.timestamp),
            is_operational = error.is_operational,
            causes = ?causes,
            "Application error: {}",
            error.message
        );
    } else {
        warn!(
            error_code = error.code.as_str(),
            route_code = error.route_code.as_deref(),
            category = error.error_type(),
            request_id = %metadata.request_id,
            correlation_id = %metadata.correlation_id,
            trace_id = %metadata.trace_id,
            endpoint = %metadata.path,
            method = %metadata.method,
            ip = %metadata.client_ip,
            user_agent = metadata.user_agent.as_deref(),
            user_id = metadata.user_id.as_deref(),
            timestamp = %format_timestamp(error.timestamp),
            is_operational = error.is_operational,
            "Application warning: {}",
            error.message
        );
    }

    record_error(&metadata.method, &metadata.route, error.code.as_str());

    let response = ApiResponse::for_category(error.category, message, error.code);
    match &error.route_code {
        Some(route_code) => response.with_route_code(route_code.clone()),
        None => response,
    }
    .send(context)
}

/// Boundary middleware: every error leaves the service through here
pub async fn dispatch_errors(request: Request, next: Next) -> Response {
    let context = RequestContext::from_request(&request);
    let mut response = next.run(request).await;

    if let Some(error) = response.extensions_mut().remove::<AppError>() {
        let mut dispatched = dispatch(&error, &context);
        carry_upstream_headers(response.headers(), dispatched.headers_mut());
        return dispatched;
    }

    if is_framework_error(&response) {
        return normalize_framework_error(response, &context).await;
    }

    response
}

/// Turn a `CatchPanicLayer` payload into an error for the dispatcher
#[allow(clippy::needless_pass_by_value)]
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    AppError::from_panic(payload.as_ref()).into_response()
}

/// Plain-text 4xx/5xx produced by extractors or the router itself
fn is_framework_error(response: &Response) -> bool {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return false;
    }

    !response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.contains("json"))
}

async fn normalize_framework_error(response: Response, context: &RequestContext) -> Response {
    let status = response.status();
    let (parts, body) = response.into_parts();

    let text = axum::body::to_bytes(body, FRAMEWORK_BODY_LIMIT)
        .await
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default();

    let error = framework_error(status, text);
    let mut dispatched = dispatch(&error, context);
    carry_upstream_headers(&parts.headers, dispatched.headers_mut());
    dispatched
}

fn framework_error(status: StatusCode, text: String) -> AppError {
    let error = match status {
        StatusCode::BAD_REQUEST => AppError::bad_request().with_code(ErrorCode::InvalidInputFormat),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => {
            AppError::new(ErrorCode::InvalidInputFormat, ErrorCategory::UnsupportedMediaType)
        }
        StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::new(ErrorCode::InvalidInputFormat, ErrorCategory::UnprocessableEntity)
        }
        StatusCode::NOT_FOUND => AppError::not_found().with_code(ErrorCode::RouteNotFound),
        StatusCode::METHOD_NOT_ALLOWED => {
            AppError::new(ErrorCode::EndpointNotFound, ErrorCategory::MethodNotAllowed)
        }
        StatusCode::PAYLOAD_TOO_LARGE => AppError::payload_too_large(),
        StatusCode::UNAUTHORIZED => AppError::unauthorized(),
        StatusCode::FORBIDDEN => AppError::forbidden(),
        StatusCode::REQUEST_TIMEOUT => AppError::timeout(),
        status if status.is_server_error() => {
            let mut error = AppError::internal();
            error.is_operational = false;
            error
        }
        _ => AppError::bad_request(),
    };

    if text.is_empty() {
        error
    } else {
        error.with_message(text)
    }
}

/// Copy every value of each upstream header the envelope did not set itself
fn carry_upstream_headers(upstream: &HeaderMap, target: &mut HeaderMap) {
    for name in upstream.keys() {
        if name == header::CONTENT_TYPE || name == header::CONTENT_LENGTH || target.contains_key(name) {
            continue;
        }
        for value in upstream.get_all(name) {
            target.append(name.clone(), value.clone());
        }
    }
}

/// Fallback for paths no route matched
pub async fn route_not_found() -> AppError {
    AppError::not_found().with_code(ErrorCode::RouteNotFound)
}
