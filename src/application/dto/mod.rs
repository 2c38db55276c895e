use crate::domain::entities::User;
use serde::{Deserialize, Serialize};

/// Data Transfer Object for user information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: u64,
    pub name: String,
    pub email: String,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self { id: user.id.as_u64(), name: user.name, email: user.email }
    }
}

/// Response DTO for user listings
#[derive(Debug, Clone, Serialize)]
pub struct UserListDto {
    pub users: Vec<UserDto>,
    pub count: usize,
}

impl UserListDto {
    pub fn new(users: Vec<UserDto>) -> Self {
        Self { count: users.len(), users }
    }
}

/// Request DTO for creating a user. Fields are optional so missing values
/// surface as validation errors rather than JSON rejections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}
