use axum::http::StatusCode;
use std::fmt;

/// Coarse classification of an error. The HTTP status of an error response is
/// always derived from its category and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Internal,
    Validation,
    Authentication,
    Authorization,
    Database,
    External,
    NotFound,
    BusinessLogic,
    System,
    BadRequest,
    Unauthorized,
    Forbidden,
    Conflict,
    PayloadTooLarge,
    ServiceUnavailable,
    Timeout,
    MethodNotAllowed,
    UnsupportedMediaType,
    UnprocessableEntity,
}

impl ErrorCategory {
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::Validation | Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Authentication | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Authorization | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BusinessLogic | Self::Conflict => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal | Self::Database | Self::System => StatusCode::INTERNAL_SERVER_ERROR,
            Self::External => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Label used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Database => "database",
            Self::External => "external",
            Self::NotFound => "not_found",
            Self::BusinessLogic => "business_logic",
            Self::System => "system",
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::PayloadTooLarge => "payload_too_large",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Timeout => "timeout",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::UnsupportedMediaType => "unsupported_media_type",
            Self::UnprocessableEntity => "unprocessable_entity",
        }
    }

    /// Database and system failures are programmer or infrastructure faults,
    /// never something the client caused.
    pub fn is_operational_by_default(self) -> bool {
        !matches!(self, Self::Database | Self::System)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorCategory::Validation, 400)]
    #[case(ErrorCategory::BadRequest, 400)]
    #[case(ErrorCategory::Authentication, 401)]
    #[case(ErrorCategory::Unauthorized, 401)]
    #[case(ErrorCategory::Authorization, 403)]
    #[case(ErrorCategory::Forbidden, 403)]
    #[case(ErrorCategory::NotFound, 404)]
    #[case(ErrorCategory::MethodNotAllowed, 405)]
    #[case(ErrorCategory::Timeout, 408)]
    #[case(ErrorCategory::Conflict, 409)]
    #[case(ErrorCategory::BusinessLogic, 409)]
    #[case(ErrorCategory::PayloadTooLarge, 413)]
    #[case(ErrorCategory::UnsupportedMediaType, 415)]
    #[case(ErrorCategory::UnprocessableEntity, 422)]
    #[case(ErrorCategory::Internal, 500)]
    #[case(ErrorCategory::Database, 500)]
    #[case(ErrorCategory::System, 500)]
    #[case(ErrorCategory::External, 502)]
    #[case(ErrorCategory::ServiceUnavailable, 503)]
    fn test_category_status(#[case] category: ErrorCategory, #[case] expected: u16) {
        assert_eq!(category.status_code().as_u16(), expected);
    }

    #[test]
    fn test_operational_defaults() {
        assert!(!ErrorCategory::Database.is_operational_by_default());
        assert!(!ErrorCategory::System.is_operational_by_default());
        assert!(ErrorCategory::Validation.is_operational_by_default());
        assert!(ErrorCategory::Internal.is_operational_by_default());
    }
}
