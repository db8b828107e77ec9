// src/storage/mod.rs — Model persistence backends

pub mod json;
pub mod schema;
pub mod sqlite;

use std::sync::Arc;

use crate::engine::Model;
use crate::infra::config::{StorageBackend, StorageConfig};
use crate::infra::errors::EngineError;

pub use json::JsonFileStore;
pub use sqlite::SqliteStore;

/// Somewhere a trained model survives restarts.
pub trait ModelStore: Send + Sync {
    fn save(&self, model: &Model) -> Result<(), EngineError>;

    /// The most recently saved model, or `None` when nothing was saved yet.
    fn load(&self) -> Result<Option<Model>, EngineError>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Build the configured store. `Memory` keeps models in process only.
pub fn open_store(config: &StorageConfig) -> Option<Arc<dyn ModelStore>> {
    let path = config.resolved_path();
    match config.backend {
        StorageBackend::Sqlite => Some(Arc::new(SqliteStore::new(path))),
        StorageBackend::Json => Some(Arc::new(JsonFileStore::new(path))),
        StorageBackend::Memory => None,
    }
}
