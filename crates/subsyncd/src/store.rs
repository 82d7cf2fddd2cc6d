//! Document store selection

use anyhow::Result;
use subsync_core::{DocumentStore, FileDocumentStore, MemoryDocumentStore, StoreConfig};
use tracing::{debug, info, warn};

/// Create the document store named by the configuration
pub async fn build_store(config: &StoreConfig) -> Result<Box<dyn DocumentStore>> {
    config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
    debug!("Building {} document store", config.type_name());

    match config {
        StoreConfig::Memory => {
            warn!("Using in-memory document store; records are not persisted");
            Ok(Box::new(MemoryDocumentStore::new()))
        }
        StoreConfig::File { path } => {
            info!("Using file document store at {}", path);
            let store = FileDocumentStore::new(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to open file store {}: {}", path, e))?;
            Ok(Box::new(store))
        }
        #[cfg(feature = "firestore")]
        StoreConfig::Firestore { .. } => {
            let store = subsync_store_firestore::FirestoreStore::from_config(config)
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            info!("Using Firestore document store (auth: {})", store.auth_kind());
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "firestore"))]
        StoreConfig::Firestore { .. } => {
            anyhow::bail!("Firestore support was not compiled in (enable the 'firestore' feature)")
        }
    }
}
