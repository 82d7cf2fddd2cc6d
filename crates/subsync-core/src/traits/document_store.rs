// # Document Store Trait
//
// Defines the interface to the store holding site records.
//
// ## Implementations
//
// - In-memory: `MemoryDocumentStore` (tests, local runs)
// - JSON file: `FileDocumentStore` (local development)
// - Firestore: `subsync-store-firestore` crate
//
// ## Consistency
//
// Updates are per document and not transactional across documents. Two
// concurrent runs may race on the same document; patches are written so that
// replaying one is harmless (array union, keyed map entries).

use async_trait::async_trait;

use crate::model::{SitePatch, SiteRecord};

/// Trait for document store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read every site record in a collection
    ///
    /// # Parameters
    ///
    /// - `collection`: Collection name
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<SiteRecord>)`: All records; `id` is always the document id
    /// - `Err(Error)`: The collection could not be read
    async fn list_sites(&self, collection: &str) -> Result<Vec<SiteRecord>, crate::Error>;

    /// Apply a partial update to one document
    ///
    /// Only the fields named by the patch are touched. `GrantAdmin` merges
    /// into `allowedAdminUserIds` with union semantics.
    ///
    /// # Parameters
    ///
    /// - `collection`: Collection name
    /// - `id`: Document id
    /// - `patch`: The update to apply
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Successfully updated
    /// - `Err(Error)`: Document missing or storage error
    async fn update_site(
        &self,
        collection: &str,
        id: &str,
        patch: &SitePatch,
    ) -> Result<(), crate::Error>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}
