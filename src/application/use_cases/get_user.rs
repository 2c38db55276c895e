use std::sync::Arc;

use super::storage_error;
use crate::{
    application::dto::UserDto,
    domain::{entities::UserId, repositories::UserRepository},
    presentation::middleware::error::AppError,
};

/// Use case for retrieving one user by id
pub struct GetUserUseCase<R>
where
    R: UserRepository + ?Sized,
{
    repository: Arc<R>,
}

impl<R> GetUserUseCase<R>
where
    R: UserRepository + ?Sized,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub async fn execute(&self, user_id: UserId) -> Result<UserDto, AppError> {
        match self.repository.find_by_id(user_id).await.map_err(storage_error)? {
            Some(user) => Ok(UserDto::from(user)),
            None => {
                tracing::warn!(%user_id, "User not found");
                Err(AppError::not_found().with_message(format!("User {user_id} not found")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::errors::ErrorCode, infrastructure::persistence::InMemoryUserRepository,
    };
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_found() {
        let use_case = GetUserUseCase::new(Arc::new(InMemoryUserRepository::seeded()));
        let user = use_case.execute(UserId::new(2)).await.unwrap();
        assert_eq!(user.name, "Jane Smith");
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let use_case = GetUserUseCase::new(Arc::new(InMemoryUserRepository::seeded()));
        let error = use_case.execute(UserId::new(99)).await.unwrap_err();

        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(error.code, ErrorCode::RequestedResourceNotFound);
        assert_eq!(error.message, "User 99 not found");
    }
}
