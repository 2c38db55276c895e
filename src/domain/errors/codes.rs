use serde::{Serialize, Serializer};
use std::fmt;

use super::category::ErrorCategory;

/// Code families. The prefix is the part of a code before the dash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorPrefix {
    App,
    Validation,
    Authentication,
    Authorization,
    Database,
    External,
    NotFound,
    BusinessLogic,
    System,
}

impl ErrorPrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "APP",
            Self::Validation => "VAL",
            Self::Authentication => "AUT",
            Self::Authorization => "AUTZ",
            Self::Database => "DB",
            Self::External => "EXT",
            Self::NotFound => "NF",
            Self::BusinessLogic => "BL",
            Self::System => "SYS",
        }
    }

    /// Category an error of this family falls into when nothing more specific is known
    pub fn default_category(self) -> ErrorCategory {
        match self {
            Self::App => ErrorCategory::Internal,
            Self::Validation => ErrorCategory::Validation,
            Self::Authentication => ErrorCategory::Authentication,
            Self::Authorization => ErrorCategory::Authorization,
            Self::Database => ErrorCategory::Database,
            Self::External => ErrorCategory::External,
            Self::NotFound => ErrorCategory::NotFound,
            Self::BusinessLogic => ErrorCategory::BusinessLogic,
            Self::System => ErrorCategory::System,
        }
    }
}

impl fmt::Display for ErrorPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable machine-readable error codes of the form `PREFIX-NNN`.
///
/// The set is closed: every code has exactly one string form and one default
/// message, and codes are never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // APP
    UnknownError,
    InternalServerError,
    ServiceUnavailable,
    RequestTimeout,

    // VAL
    ValidationError,
    InvalidInputFormat,
    MissingRequiredField,
    InvalidFieldValue,
    InvalidDataType,
    FieldLengthExceeded,

    // AUT
    AuthenticationError,
    InvalidCredentials,
    TokenExpired,
    InvalidToken,
    TokenMissing,
    AuthenticationRequired,

    // AUTZ
    AuthorizationError,
    InsufficientPermissions,
    AccessDenied,
    ResourceForbidden,

    // DB
    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseQueryFailed,
    DatabaseTransactionFailed,
    DatabaseConstraintViolation,
    DatabaseRecordNotFound,

    // EXT
    ExternalServiceError,
    ExternalServiceUnavailable,
    ExternalServiceTimeout,
    ExternalInvalidResponse,

    // NF
    ResourceNotFound,
    RequestedResourceNotFound,
    RouteNotFound,
    EndpointNotFound,

    // BL
    BusinessLogicError,
    InvalidOperation,
    BusinessRuleViolation,
    DuplicateEntry,
    StateConflict,

    // SYS
    SystemError,
    ConfigurationError,
    EnvironmentError,
    MemoryError,
}

impl ErrorCode {
    pub const ALL: [Self; 43] = [
        Self::UnknownError,
        Self::InternalServerError,
        Self::ServiceUnavailable,
        Self::RequestTimeout,
        Self::ValidationError,
        Self::InvalidInputFormat,
        Self::MissingRequiredField,
        Self::InvalidFieldValue,
        Self::InvalidDataType,
        Self::FieldLengthExceeded,
        Self::AuthenticationError,
        Self::InvalidCredentials,
        Self::TokenExpired,
        Self::InvalidToken,
        Self::TokenMissing,
        Self::AuthenticationRequired,
        Self::AuthorizationError,
        Self::InsufficientPermissions,
        Self::AccessDenied,
        Self::ResourceForbidden,
        Self::DatabaseError,
        Self::DatabaseConnectionFailed,
        Self::DatabaseQueryFailed,
        Self::DatabaseTransactionFailed,
        Self::DatabaseConstraintViolation,
        Self::DatabaseRecordNotFound,
        Self::ExternalServiceError,
        Self::ExternalServiceUnavailable,
        Self::ExternalServiceTimeout,
        Self::ExternalInvalidResponse,
        Self::ResourceNotFound,
        Self::RequestedResourceNotFound,
        Self::RouteNotFound,
        Self::EndpointNotFound,
        Self::BusinessLogicError,
        Self::InvalidOperation,
        Self::BusinessRuleViolation,
        Self::DuplicateEntry,
        Self::StateConflict,
        Self::SystemError,
        Self::ConfigurationError,
        Self::EnvironmentError,
        Self::MemoryError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownError => "APP-000",
            Self::InternalServerError => "APP-001",
            Self::ServiceUnavailable => "APP-002",
            Self::RequestTimeout => "APP-003",
            Self::ValidationError => "VAL-000",
            Self::InvalidInputFormat => "VAL-001",
            Self::MissingRequiredField => "VAL-002",
            Self::InvalidFieldValue => "VAL-003",
            Self::InvalidDataType => "VAL-004",
            Self::FieldLengthExceeded => "VAL-005",
            Self::AuthenticationError => "AUT-000",
            Self::InvalidCredentials => "AUT-001",
            Self::TokenExpired => "AUT-002",
            Self::InvalidToken => "AUT-003",
            Self::TokenMissing => "AUT-004",
            Self::AuthenticationRequired => "AUT-005",
            Self::AuthorizationError => "AUTZ-000",
            Self::InsufficientPermissions => "AUTZ-001",
            Self::AccessDenied => "AUTZ-002",
            Self::ResourceForbidden => "AUTZ-003",
            Self::DatabaseError => "DB-000",
            Self::DatabaseConnectionFailed => "DB-001",
            Self::DatabaseQueryFailed => "DB-002",
            Self::DatabaseTransactionFailed => "DB-003",
            Self::DatabaseConstraintViolation => "DB-004",
            Self::DatabaseRecordNotFound => "DB-005",
            Self::ExternalServiceError => "EXT-000",
            Self::ExternalServiceUnavailable => "EXT-001",
            Self::ExternalServiceTimeout => "EXT-002",
            Self::ExternalInvalidResponse => "EXT-003",
            Self::ResourceNotFound => "NF-000",
            Self::RequestedResourceNotFound => "NF-001",
            Self::RouteNotFound => "NF-002",
            Self::EndpointNotFound => "NF-003",
            Self::BusinessLogicError => "BL-000",
            Self::InvalidOperation => "BL-001",
            Self::BusinessRuleViolation => "BL-002",
            Self::DuplicateEntry => "BL-003",
            Self::StateConflict => "BL-004",
            Self::SystemError => "SYS-000",
            Self::ConfigurationError => "SYS-001",
            Self::EnvironmentError => "SYS-002",
            Self::MemoryError => "SYS-003",
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            Self::UnknownError => "An unknown application error occurred",
            Self::InternalServerError => "Internal server error",
            Self::ServiceUnavailable => "Service is currently unavailable",
            Self::RequestTimeout => "Request timeout",
            Self::ValidationError => "Validation error occurred",
            Self::InvalidInputFormat => "Invalid input format",
            Self::MissingRequiredField => "Missing required field",
            Self::InvalidFieldValue => "Invalid field value",
            Self::InvalidDataType => "Invalid data type",
            Self::FieldLengthExceeded => "Field length exceeded",
            Self::AuthenticationError => "Authentication error occurred",
            Self::InvalidCredentials => "Invalid credentials",
            Self::TokenExpired => "Authentication token has expired",
            Self::InvalidToken => "Invalid authentication token",
            Self::TokenMissing => "Authentication token is missing",
            Self::AuthenticationRequired => "Authentication required",
            Self::AuthorizationError => "Authorization error occurred",
            Self::InsufficientPermissions => "Insufficient permissions",
            Self::AccessDenied => "Access denied",
            Self::ResourceForbidden => "Resource is forbidden",
            Self::DatabaseError => "Database error occurred",
            Self::DatabaseConnectionFailed => "Database connection failed",
            Self::DatabaseQueryFailed => "Database query failed",
            Self::DatabaseTransactionFailed => "Database transaction failed",
            Self::DatabaseConstraintViolation => "Database constraint violation",
            Self::DatabaseRecordNotFound => "Record not found in database",
            Self::ExternalServiceError => "External service error occurred",
            Self::ExternalServiceUnavailable => "External service is unavailable",
            Self::ExternalServiceTimeout => "External service timeout",
            Self::ExternalInvalidResponse => "Invalid response from external service",
            Self::ResourceNotFound => "Resource not found",
            Self::RequestedResourceNotFound => "The requested resource was not found",
            Self::RouteNotFound => "Route not found",
            Self::EndpointNotFound => "Endpoint not found",
            Self::BusinessLogicError => "Business logic error occurred",
            Self::InvalidOperation => "Invalid operation",
            Self::BusinessRuleViolation => "Business rule violation",
            Self::DuplicateEntry => "Duplicate entry detected",
            Self::StateConflict => "State conflict occurred",
            Self::SystemError => "System error occurred",
            Self::ConfigurationError => "Configuration error",
            Self::EnvironmentError => "Environment error",
            Self::MemoryError => "Memory error",
        }
    }

    pub fn prefix(self) -> ErrorPrefix {
        match self {
            Self::UnknownError
            | Self::InternalServerError
            | Self::ServiceUnavailable
            | Self::RequestTimeout => ErrorPrefix::App,
            Self::ValidationError
            | Self::InvalidInputFormat
            | Self::MissingRequiredField
            | Self::InvalidFieldValue
            | Self::InvalidDataType
            | Self::FieldLengthExceeded => ErrorPrefix::Validation,
            Self::AuthenticationError
            | Self::InvalidCredentials
            | Self::TokenExpired
            | Self::InvalidToken
            | Self::TokenMissing
            | Self::AuthenticationRequired => ErrorPrefix::Authentication,
            Self::AuthorizationError
            | Self::InsufficientPermissions
            | Self::AccessDenied
            | Self::ResourceForbidden => ErrorPrefix::Authorization,
            Self::DatabaseError
            | Self::DatabaseConnectionFailed
            | Self::DatabaseQueryFailed
            | Self::DatabaseTransactionFailed
            | Self::DatabaseConstraintViolation
            | Self::DatabaseRecordNotFound => ErrorPrefix::Database,
            Self::ExternalServiceError
            | Self::ExternalServiceUnavailable
            | Self::ExternalServiceTimeout
            | Self::ExternalInvalidResponse => ErrorPrefix::External,
            Self::ResourceNotFound
            | Self::RequestedResourceNotFound
            | Self::RouteNotFound
            | Self::EndpointNotFound => ErrorPrefix::NotFound,
            Self::BusinessLogicError
            | Self::InvalidOperation
            | Self::BusinessRuleViolation
            | Self::DuplicateEntry
            | Self::StateConflict => ErrorPrefix::BusinessLogic,
            Self::SystemError
            | Self::ConfigurationError
            | Self::EnvironmentError
            | Self::MemoryError => ErrorPrefix::System,
        }
    }

    /// Look a code up by its wire form, e.g. `"VAL-001"`
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
