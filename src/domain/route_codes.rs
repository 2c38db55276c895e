//! Endpoint-specific success and error codes layered on top of the system
//! error codes.
//!
//! Codes follow the `ROUTE-NNN-SUC` / `ROUTE-NNN-ERR` shape. The registry is
//! assembled once at startup and shared read-only afterwards; lookups never
//! fail a request, callers fall back to the generic codes below on a miss.

use serde::Serialize;
use std::collections::HashMap;

/// A single `{code, message}` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteCode {
    pub code: String,
    pub message: String,
}

impl RouteCode {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCodeKind {
    Success,
    Error,
}

/// Success and error codes registered for one route
#[derive(Debug, Clone, Default)]
pub struct RouteCodes {
    success: HashMap<String, RouteCode>,
    error: HashMap<String, RouteCode>,
}

impl RouteCodes {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn success(mut self, key: &str, code: &str, message: &str) -> Self {
        self.success.insert(key.to_string(), RouteCode::new(code, message));
        self
    }

    #[must_use]
    pub fn error(mut self, key: &str, code: &str, message: &str) -> Self {
        self.error.insert(key.to_string(), RouteCode::new(code, message));
        self
    }

    pub fn get(&self, kind: RouteCodeKind, key: &str) -> Option<&RouteCode> {
        match kind {
            RouteCodeKind::Success => self.success.get(key),
            RouteCodeKind::Error => self.error.get(key),
        }
    }
}

/// Generic codes used when a route has nothing more specific registered
pub mod generic {
    pub const SUCCESS: (&str, &str) = ("SUC-000", "Operation completed successfully");
    pub const CREATED: (&str, &str) = ("SUC-001", "Resource created successfully");
    pub const UPDATED: (&str, &str) = ("SUC-002", "Resource updated successfully");
    pub const DELETED: (&str, &str) = ("SUC-003", "Resource deleted successfully");
    pub const RETRIEVED: (&str, &str) = ("SUC-004", "Resource retrieved successfully");
    pub const NOT_FOUND: (&str, &str) = ("ERR-000", "Resource not found");
    pub const VALIDATION_FAILED: (&str, &str) = ("ERR-001", "Validation failed");
    pub const OPERATION_FAILED: (&str, &str) = ("ERR-002", "Operation failed");
}

/// Route names and code keys of the built-in catalogue
pub mod names {
    pub const API_HEALTH_CHECK: &str = "api-health-check";
    pub const GET_USERS: &str = "get-users";
    pub const CREATE_USER: &str = "create-user";
    pub const UPDATE_USER: &str = "update-user";
    pub const DELETE_USER: &str = "delete-user";
}

/// Read-only map from route name to its codes
#[derive(Debug, Clone, Default)]
pub struct RouteCodeRegistry {
    routes: HashMap<String, RouteCodes>,
}

impl RouteCodeRegistry {
    pub fn builder() -> RouteCodeRegistryBuilder {
        RouteCodeRegistryBuilder::default()
    }

    /// Registry preloaded with the service's own routes
    pub fn with_defaults() -> Self {
        Self::builder()
            .register(
                names::API_HEALTH_CHECK,
                RouteCodes::new()
                    .success("VERIFY_SUCCESS", "API-001-SUC", "API health check successful")
                    .error("VERIFY_FAILED", "API-001-ERR", "API health check failed"),
            )
            .register(
                names::GET_USERS,
                RouteCodes::new()
                    .success("USERS_RETRIEVED", "USR-001-SUC", "Users retrieved successfully")
                    .success("USERS_EMPTY", "USR-002-SUC", "No users found")
                    .error("USERS_FETCH_FAILED", "USR-001-ERR", "Failed to fetch users")
                    .error("USERS_DB_ERROR", "USR-002-ERR", "Database error while fetching users")
                    .error("USERS_UNAUTHORIZED", "USR-003-ERR", "Unauthorized to access users"),
            )
            .register(
                names::CREATE_USER,
                RouteCodes::new()
                    .success("USER_CREATED", "USR-010-SUC", "User created successfully")
                    .error("USER_CREATION_FAILED", "USR-010-ERR", "Failed to create user")
                    .error("USER_ALREADY_EXISTS", "USR-011-ERR", "User already exists")
                    .error("USER_VALIDATION_FAILED", "USR-012-ERR", "User validation failed"),
            )
            .register(
                names::UPDATE_USER,
                RouteCodes::new()
                    .success("USER_UPDATED", "USR-020-SUC", "User updated successfully")
                    .error("USER_UPDATE_FAILED", "USR-020-ERR", "Failed to update user")
                    .error("USER_NOT_FOUND", "USR-021-ERR", "User not found"),
            )
            .register(
                names::DELETE_USER,
                RouteCodes::new()
                    .success("USER_DELETED", "USR-030-SUC", "User deleted successfully")
                    .error("USER_DELETE_FAILED", "USR-030-ERR", "Failed to delete user")
                    .error("USER_NOT_FOUND", "USR-031-ERR", "User not found"),
            )
            .build()
    }

    pub fn lookup(&self, route: &str, kind: RouteCodeKind, key: &str) -> Option<&RouteCode> {
        self.routes.get(route).and_then(|codes| codes.get(kind, key))
    }

    pub fn success_or_default(&self, route: &str, key: &str) -> RouteCode {
        self.lookup(route, RouteCodeKind::Success, key).cloned().unwrap_or_else(|| {
            let (code, message) = generic::SUCCESS;
            RouteCode::new(code, message)
        })
    }

    pub fn error_or_default(&self, route: &str, key: &str) -> RouteCode {
        self.lookup(route, RouteCodeKind::Error, key).cloned().unwrap_or_else(|| {
            let (code, message) = generic::OPERATION_FAILED;
            RouteCode::new(code, message)
        })
    }

    pub fn has_route(&self, route: &str) -> bool {
        self.routes.contains_key(route)
    }

    pub fn route_codes(&self, route: &str) -> Option<&RouteCodes> {
        self.routes.get(route)
    }
}

#[derive(Debug, Default)]
pub struct RouteCodeRegistryBuilder {
    routes: HashMap<String, RouteCodes>,
}

impl RouteCodeRegistryBuilder {
    /// Registering the same route twice replaces the earlier bundle
    #[must_use]
    pub fn register(mut self, route: &str, codes: RouteCodes) -> Self {
        self.routes.insert(route.to_string(), codes);
        self
    }

    pub fn build(self) -> RouteCodeRegistry {
        RouteCodeRegistry { routes: self.routes }
    }
}
