use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    domain::{
        entities::{User, UserId},
        repositories::UserRepository,
    },
    presentation::middleware::error::AppError,
};

#[derive(Debug, Default)]
struct Store {
    users: BTreeMap<UserId, User>,
    last_id: u64,
}

/// Process-local user store
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with the two demo users
    pub fn seeded() -> Self {
        let mut store = Store::default();
        for (name, email) in [("John Doe", "john@example.com"), ("Jane Smith", "jane@example.com")] {
            store.last_id += 1;
            let id = UserId::new(store.last_id);
            store.users.insert(id, User::new(id, name, email));
        }
        Self { store: Arc::new(RwLock::new(store)) }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    type Error = AppError;

    async fn list(&self) -> Result<Vec<User>, Self::Error> {
        Ok(self.store.read().await.users.values().cloned().collect())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Self::Error> {
        Ok(self.store.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Self::Error> {
        Ok(self.store.read().await.users.values().find(|user| user.has_email(email)).cloned())
    }

    async fn insert_unique(&self, name: String, email: String) -> Result<Option<User>, Self::Error> {
        let mut store = self.store.write().await;
        if store.users.values().any(|user| user.has_email(&email)) {
            return Ok(None);
        }

        let id = UserId::new(store.last_id).next();
        store.last_id = id.as_u64();

        let user = User { id, name, email };
        store.users.insert(id, user.clone());
        debug!(user_id = %id, "User stored");
        Ok(Some(user))
    }
}
