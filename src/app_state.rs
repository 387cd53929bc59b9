use std::sync::Arc;
use tracing::info;

use crate::{
    config::Config,
    infrastructure::{ensure_parent_dir, DatabaseInterface, SqliteDatabase},
    services::{CounterReconciler, RelationshipStore},
};

#[derive(Clone)]
pub struct AppState {
    pub store: RelationshipStore,
    pub reconciler: Arc<CounterReconciler>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Initialize database
        ensure_parent_dir(&config.database.url)?;
        let database =
            SqliteDatabase::connect(&config.database.url, config.database.max_connections).await?;
        let database: Arc<dyn DatabaseInterface> = Arc::new(database);
        info!("Database ready at {}", config.database.url);

        let store = RelationshipStore::new(database, config.store.clone());
        Ok(Self::from_store(store, config))
    }

    /// Wrap an already opened store, sharing its database with the reconciler
    pub fn from_store(store: RelationshipStore, config: Config) -> Self {
        let reconciler = Arc::new(CounterReconciler::new(store.database()));
        Self {
            store,
            reconciler,
            config,
        }
    }
}
