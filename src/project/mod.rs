// Project module for Brief Autopilot
//
// This module holds the project records the workflow engine drives and the
// stores that persist them.

pub mod store;
pub mod types;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};

// Re-export commonly used types
pub use store::{FileProjectStore, MemoryProjectStore, ProjectStore};
pub use types::*;

/// Open the store backend selected by configuration
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn ProjectStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory project store (demo mode)");
            Ok(Arc::new(MemoryProjectStore::new()))
        }
        StoreBackend::File => {
            tracing::info!("Using project store at {}", config.state_file.display());
            let store = FileProjectStore::open(&config.state_file)
                .await
                .with_context(|| {
                    format!("Failed to open project store: {}", config.state_file.display())
                })?;
            Ok(Arc::new(store))
        }
    }
}
