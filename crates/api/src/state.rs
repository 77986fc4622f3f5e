//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;

/// State shared by all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }
}
