use std::sync::Arc;

use super::storage_error;
use crate::{
    application::dto::{CreateUserRequest, UserDto},
    domain::{errors::ErrorCode, repositories::UserRepository},
    presentation::middleware::error::AppError,
};

pub const MAX_NAME_LENGTH: usize = 100;

/// Use case for registering a user with a unique email
pub struct CreateUserUseCase<R>
where
    R: UserRepository + ?Sized,
{
    repository: Arc<R>,
}

impl<R> CreateUserUseCase<R>
where
    R: UserRepository + ?Sized,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub async fn execute(&self, request: CreateUserRequest) -> Result<UserDto, AppError> {
        let (name, email) = validate(request)?;

        let Some(user) = self.repository.insert_unique(name, email).await.map_err(storage_error)?
        else {
            return Err(AppError::conflict().with_message("A user with this email already exists"));
        };
        tracing::info!(user_id = %user.id, "User created");
        Ok(UserDto::from(user))
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty()).ok_or_else(|| {
        AppError::validation()
            .with_code(ErrorCode::MissingRequiredField)
            .with_message(format!("{field} is required"))
    })
}

fn validate(request: CreateUserRequest) -> Result<(String, String), AppError> {
    let name = required(request.name, "name")?;
    let email = required(request.email, "email")?;

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::validation()
            .with_code(ErrorCode::FieldLengthExceeded)
            .with_message(format!("name must be at most {MAX_NAME_LENGTH} characters")));
    }

    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
        && !email.contains(char::is_whitespace);
    if !valid_email {
        return Err(AppError::validation()
            .with_code(ErrorCode::InvalidFieldValue)
            .with_message("email must be a valid email address"));
    }

    Ok((name, email))
}
