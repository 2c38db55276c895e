use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use super::envelope::ResponseEnvelope;
use crate::{
    domain::{
        errors::{ErrorCategory, ErrorCode, ErrorPrefix},
        route_codes::RouteCodeRegistry,
    },
    presentation::middleware::{error::AppError, request_metadata::RequestContext},
};

/// One outgoing response, described but not yet written.
///
/// `send` consumes the value, so a given response can be written at most once.
#[derive(Debug, Clone)]
#[must_use = "an ApiResponse does nothing until it is sent"]
pub struct ApiResponse {
    status: StatusCode,
    message: Value,
    data: Option<Value>,
    error_code: Option<ErrorCode>,
    route_code: Option<String>,
}

impl ApiResponse {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Value::String(message.into()),
            data: None,
            error_code: None,
            route_code: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, message)
    }

    pub fn created(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CREATED, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Error response whose status is the category's status
    pub fn for_category(
        category: ErrorCategory,
        message: impl Into<String>,
        error_code: ErrorCode,
    ) -> Self {
        Self::new(category.status_code(), message).with_error_code(error_code)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Replace the message with a structured value
    pub fn with_structured_message(mut self, message: Value) -> Self {
        self.message = message;
        self
    }

    pub fn with_error_code(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn with_route_code(mut self, code: impl Into<String>) -> Self {
        self.route_code = Some(code.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn send(self, context: &RequestContext) -> Response {
        let envelope = ResponseEnvelope::build(
            context,
            self.message,
            self.data,
            self.error_code.map(|code| code.as_str().to_string()),
            self.route_code,
        );

        (self.status, Json(envelope)).into_response()
    }
}

/// Success response carrying the route's registered code, or the generic
/// success code when the route or key is unknown
pub fn route_success(
    registry: &RouteCodeRegistry,
    route: &str,
    key: &str,
    data: Option<Value>,
    custom_message: Option<&str>,
) -> ApiResponse {
    let route_code = registry.success_or_default(route, key);
    let message = custom_message.map_or(route_code.message, String::from);

    let response = ApiResponse::success(message).with_route_code(route_code.code);
    match data {
        Some(data) => response.with_data(data),
        None => response,
    }
}

/// Error carrying the route's registered code, for the dispatcher to render.
/// The status follows the system code's family: NF 404, AUT 401, AUTZ 403,
/// BL 409, anything else 400.
pub fn route_error(
    registry: &RouteCodeRegistry,
    route: &str,
    key: &str,
    system_code: ErrorCode,
    custom_message: Option<&str>,
) -> AppError {
    let route_code = registry.error_or_default(route, key);
    let message = custom_message.map_or(route_code.message, String::from);

    let category = match system_code.prefix() {
        ErrorPrefix::NotFound => ErrorCategory::NotFound,
        ErrorPrefix::Authentication => ErrorCategory::Unauthorized,
        ErrorPrefix::Authorization => ErrorCategory::Forbidden,
        ErrorPrefix::BusinessLogic => ErrorCategory::BusinessLogic,
        _ => ErrorCategory::BadRequest,
    };

    AppError::new(system_code, category).with_message(message).with_route_code(route_code.code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::route_codes::names,
        infrastructure::config::RuntimeMode,
        presentation::middleware::request_metadata::RequestMetadata,
    };
    use axum::{body::Body, extract::Request};
    use http_body_util::BodyExt;
    use rstest::rstest;
    use serde_json::json;
    use std::time::Instant;

    fn context() -> RequestContext {
        let request = Request::builder().uri("/api/users").body(Body::empty()).unwrap();
        let mut context = RequestContext::detached(RequestMetadata::from_request(&request));
        context.mode = RuntimeMode::Test;
        context.started_at = Some(Instant::now());
        context
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_send_writes_envelope_with_status() {
        let response = ApiResponse::created("User created successfully")
            .with_data(json!({"id": "u-1"}))
            .with_route_code("USR-010-SUC")
            .send(&context());

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "User created successfully");
        assert_eq!(body["data"]["id"], "u-1");
        assert_eq!(body["routeCode"], "USR-010-SUC");
        assert!(body["processingTime"].as_u64().is_some());
    }

    #[rstest]
    #[case(ErrorCategory::NotFound, StatusCode::NOT_FOUND)]
    #[case(ErrorCategory::Validation, StatusCode::BAD_REQUEST)]
    #[case(ErrorCategory::Conflict, StatusCode::CONFLICT)]
    #[case(ErrorCategory::External, StatusCode::BAD_GATEWAY)]
    fn test_for_category_uses_category_status(
        #[case] category: ErrorCategory,
        #[case] expected: StatusCode,
    ) {
        let response = ApiResponse::for_category(category, "x", ErrorCode::UnknownError);
        assert_eq!(response.status(), expected);
    }

    #[tokio::test]
    async fn test_structured_message() {
        let response = ApiResponse::bad_request("ignored")
            .with_structured_message(json!({"email": "required"}))
            .with_error_code(ErrorCode::MissingRequiredField)
            .send(&context());

        let body = body_json(response).await;
        assert_eq!(body["message"]["email"], "required");
        assert_eq!(body["errorCode"], "VAL-002");
    }

    #[tokio::test]
    async fn test_route_success_uses_registered_code() {
        let registry = RouteCodeRegistry::with_defaults();
        let response =
            route_success(&registry, names::GET_USERS, "USERS_RETRIEVED", Some(json!([])), None)
                .send(&context());

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["routeCode"], "USR-001-SUC");
        assert_eq!(body["message"], "Users retrieved successfully");
    }

    #[test]
    fn test_route_success_miss_falls_back() {
        let registry = RouteCodeRegistry::with_defaults();
        let response = route_success(&registry, "nope", "NOPE", None, Some("done"));
        assert_eq!(response.route_code.as_deref(), Some("SUC-000"));
        assert_eq!(response.message, json!("done"));
    }

    #[rstest]
    #[case(ErrorCode::ResourceNotFound, StatusCode::NOT_FOUND)]
    #[case(ErrorCode::TokenMissing, StatusCode::UNAUTHORIZED)]
    #[case(ErrorCode::AccessDenied, StatusCode::FORBIDDEN)]
    #[case(ErrorCode::DuplicateEntry, StatusCode::CONFLICT)]
    #[case(ErrorCode::InvalidFieldValue, StatusCode::BAD_REQUEST)]
    #[case(ErrorCode::DatabaseError, StatusCode::BAD_REQUEST)]
    fn test_route_error_status_follows_prefix(
        #[case] code: ErrorCode,
        #[case] expected: StatusCode,
    ) {
        let registry = RouteCodeRegistry::with_defaults();
        let error = route_error(&registry, names::UPDATE_USER, "USER_NOT_FOUND", code, None);
        assert_eq!(error.status_code(), expected);
        assert_eq!(error.route_code.as_deref(), Some("USR-021-ERR"));
        assert_eq!(error.code, code);
        assert_eq!(error.message, "User not found");
    }

    #[test]
    fn test_route_error_miss_falls_back_to_generic() {
        let registry = RouteCodeRegistry::with_defaults();
        let error = route_error(&registry, "unknown", "UNKNOWN", ErrorCode::InvalidOperation, None);

        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        assert_eq!(error.route_code.as_deref(), Some("ERR-002"));
        assert_eq!(error.message, "Operation failed");

        let error = route_error(
            &registry,
            names::CREATE_USER,
            "USER_ALREADY_EXISTS",
            ErrorCode::DuplicateEntry,
            Some("A user with this email already exists"),
        );
        assert_eq!(error.message, "A user with this email already exists");
    }
}
