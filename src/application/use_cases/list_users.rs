use std::sync::Arc;

use super::storage_error;
use crate::{
    application::dto::{UserDto, UserListDto},
    domain::repositories::UserRepository,
    presentation::middleware::error::AppError,
};

/// Use case for listing every user
pub struct ListUsersUseCase<R>
where
    R: UserRepository + ?Sized,
{
    repository: Arc<R>,
}

impl<R> ListUsersUseCase<R>
where
    R: UserRepository + ?Sized,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub async fn execute(&self) -> Result<UserListDto, AppError> {
        let users = self.repository.list().await.map_err(storage_error)?;
        tracing::debug!(count = users.len(), "Listed users");
        Ok(UserListDto::new(users.into_iter().map(UserDto::from).collect()))
    }
}
