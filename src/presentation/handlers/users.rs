use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::AppState;
use crate::{
    application::{
        dto::CreateUserRequest,
        use_cases::{CreateUserUseCase, GetUserUseCase, ListUsersUseCase},
    },
    domain::{
        entities::UserId,
        errors::{ErrorCategory, ErrorCode},
        route_codes::names,
    },
    presentation::{
        middleware::{error::AppError, request_metadata::RequestContext},
        response::{route_error, route_success, ApiResponse},
    },
};

/// `GET /api/users`
pub async fn list_users(
    State(state): State<AppState>,
    context: RequestContext,
) -> Result<Response, AppError> {
    let registry = &state.route_codes;

    let listing = match ListUsersUseCase::new(Arc::clone(&state.users)).execute().await {
        Ok(listing) => listing,
        Err(error) if error.category == ErrorCategory::Database => {
            return Err(route_error(
                registry,
                names::GET_USERS,
                "USERS_DB_ERROR",
                ErrorCode::DatabaseQueryFailed,
                None,
            )
            .with_cause(error));
        }
        Err(error) => {
            return Err(route_error(
                registry,
                names::GET_USERS,
                "USERS_FETCH_FAILED",
                ErrorCode::InternalServerError,
                None,
            )
            .with_cause(error));
        }
    };

    let key = if listing.count == 0 { "USERS_EMPTY" } else { "USERS_RETRIEVED" };
    let data = serde_json::to_value(&listing).map_err(AppError::unexpected)?;

    Ok(route_success(registry, names::GET_USERS, key, Some(data), None).send(&context))
}

/// `GET /api/users/{id}`
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    context: RequestContext,
) -> Result<Response, AppError> {
    let user = GetUserUseCase::new(Arc::clone(&state.users)).execute(UserId::new(id)).await?;

    Ok(route_success(
        &state.route_codes,
        names::GET_USERS,
        "USERS_RETRIEVED",
        Some(json!({ "user": user })),
        Some("User retrieved successfully"),
    )
    .send(&context))
}

/// `POST /api/users`
pub async fn create_user(
    State(state): State<AppState>,
    context: RequestContext,
    Json(request): Json<CreateUserRequest>,
) -> Result<Response, AppError> {
    let registry = &state.route_codes;

    match CreateUserUseCase::new(Arc::clone(&state.users)).execute(request).await {
        Ok(user) => {
            let code = registry.success_or_default(names::CREATE_USER, "USER_CREATED");
            Ok(ApiResponse::created(code.message)
                .with_route_code(code.code)
                .with_data(json!({ "user": user }))
                .send(&context))
        }
        Err(error) if error.code == ErrorCode::DuplicateEntry => Err(route_error(
            registry,
            names::CREATE_USER,
            "USER_ALREADY_EXISTS",
            error.code,
            Some(&error.message),
        )),
        Err(error) if error.category == ErrorCategory::Validation => Err(route_error(
            registry,
            names::CREATE_USER,
            "USER_VALIDATION_FAILED",
            error.code,
            Some(&error.message),
        )),
        Err(error) => Err(error),
    }
}
