use axum::{routing::get, Router};

use crate::presentation::handlers::{health, users, AppState};

/// Routes mounted under `/api`
pub fn create_routes(app_state: AppState) -> Router {
    Router::new().nest("/api", api_routes()).with_state(app_state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api-health-check/verify", get(health::verify))
        .nest("/users", user_routes())
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/{id}", get(users::get_user))
}
