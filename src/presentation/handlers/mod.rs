pub mod health;
pub mod users;

use std::{sync::Arc, time::Instant};

use crate::{
    domain::route_codes::RouteCodeRegistry,
    infrastructure::{config::AppConfig, persistence::InMemoryUserRepository},
};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub route_codes: Arc<RouteCodeRegistry>,
    pub users: Arc<InMemoryUserRepository>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            route_codes: Arc::new(RouteCodeRegistry::with_defaults()),
            users: Arc::new(InMemoryUserRepository::seeded()),
            started_at: Instant::now(),
        }
    }
}
