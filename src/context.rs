/// Application context and dependency injection
use crate::{config::ServerConfig, db, error::ApResult, store::Store};
use std::sync::Arc;
use url::Url;

/// Shared request-scoped services: configuration and the Resource Store.
/// Handed to every component by parameter injection; there is no global
/// connection state.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub store: Store,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApResult<Self> {
        config.validate()?;

        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default())
            .await?;
        db::run_migrations(&pool).await?;

        Ok(Self {
            config: Arc::new(config),
            store: Store::new(pool),
        })
    }

    /// Public base URL of this node
    pub fn base_url(&self) -> &Url {
        &self.config.service.base_url
    }
}
