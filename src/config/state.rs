// Application state module
// Shared, read-only state handed to every connection

use std::sync::Arc;

use super::types::Config;
use crate::storage::{DataStore, FileStore, StoreError};

/// Application state
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DataStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DataStore>) -> Self {
        Self { config, store }
    }

    /// Build state backed by the configured directories, creating them if needed
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        let store = FileStore::open(&config.storage).await?;
        Ok(Self::new(config.clone(), Arc::new(store)))
    }
}
