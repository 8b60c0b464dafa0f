//! Callpool server - outreach call-campaign coordinator

pub mod api;
pub mod audit;
pub mod error;
pub mod import;
pub mod models;
pub mod store;

use sqlx::SqlitePool;
use std::sync::Arc;

use store::StoreConfig;

/// Application state shared across handlers
pub struct AppState {
    pub store: store::Store,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self {
            store: store::Store::new(pool),
        })
    }

    pub fn with_config(pool: SqlitePool, config: StoreConfig) -> Arc<Self> {
        Arc::new(Self {
            store: store::Store::with_config(pool, config),
        })
    }
}
