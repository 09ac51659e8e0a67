pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{Store, StoreError, StoreRef};

use std::sync::Arc;

use crate::config::{self, StorageBackend};

/// Open the configured backend, migrating the schema when enabled
pub async fn open_store() -> Result<StoreRef, DatabaseError> {
    let settings = &config::config().database;
    match settings.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let manager = DatabaseManager::connect().await?;
            if settings.run_migrations {
                manager.migrate().await?;
            }
            Ok(Arc::new(PgStore::new(&manager)))
        }
    }
}
