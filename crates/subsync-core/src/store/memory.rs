// # Memory Document Store
//
// In-memory implementation of DocumentStore.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for tests and for running the handler locally against seeded data.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{SitePatch, SiteRecord};
use crate::traits::DocumentStore;

type Collections = HashMap<String, BTreeMap<String, SiteRecord>>;

/// In-memory document store implementation
///
/// Collections are maps of document id to record, protected by a RwLock.
/// Listing returns records in id order.
///
/// # Example
///
/// ```rust,no_run
/// use subsync_core::{DocumentStore, MemoryDocumentStore, SiteRecord};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryDocumentStore::new();
///     store.insert("sites", SiteRecord::new("acme")).await;
///
///     let sites = store.list_sites("sites").await?;
///     assert_eq!(sites.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<RwLock<Collections>>,
}

impl MemoryDocumentStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record
    pub async fn insert(&self, collection: &str, record: SiteRecord) {
        let mut guard = self.inner.write().await;
        guard
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Get a copy of one record
    pub async fn get(&self, collection: &str, id: &str) -> Option<SiteRecord> {
        let guard = self.inner.read().await;
        guard.get(collection).and_then(|docs| docs.get(id)).cloned()
    }

    /// Get the number of records in a collection
    pub async fn len(&self, collection: &str) -> usize {
        let guard = self.inner.read().await;
        guard.get(collection).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_sites(&self, collection: &str) -> Result<Vec<SiteRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_site(&self, collection: &str, id: &str, patch: &SitePatch) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let record = guard
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| Error::store(format!("No document {}/{}", collection, id)))?;
        record.apply(patch);
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}
