use crate::domain::entities::{User, UserId};
use async_trait::async_trait;

/// Repository trait for user persistence
#[async_trait]
pub trait UserRepository: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// All users, ordered by id
    async fn list(&self) -> Result<Vec<User>, Self::Error>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Self::Error>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Self::Error>;

    /// Store a new user and assign its id, unless the email is already taken.
    /// The check and the write are one atomic step; `None` means taken.
    async fn insert_unique(&self, name: String, email: String) -> Result<Option<User>, Self::Error>;
}
