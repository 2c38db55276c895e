mod create_user;
mod get_user;
mod list_users;

pub use create_user::{CreateUserUseCase, MAX_NAME_LENGTH};
pub use get_user::GetUserUseCase;
pub use list_users::ListUsersUseCase;

use crate::{domain::errors::ErrorCode, presentation::middleware::error::AppError};

/// Storage failures surface as database errors with the cause attached
fn storage_error<E>(err: E) -> AppError
where
    E: std::error::Error + Send + Sync + 'static,
{
    AppError::database()
        .with_code(ErrorCode::DatabaseQueryFailed)
        .with_message(format!("User storage failed: {err}"))
        .with_cause(err)
}
