// # File Document Store
//
// File-based implementation of DocumentStore for local development.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "updated_at": "2025-01-09T12:00:00Z",
//   "collections": {
//     "sites": {
//       "acme": {
//         "id": "acme",
//         "apiKey": "...",
//         "subscriptionID": "4021",
//         "availableUsers": { "u1": "Alice" },
//         "allowedAdminUserIds": []
//       }
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{SitePatch, SiteRecord};
use crate::traits::DocumentStore;

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

type Collections = HashMap<String, BTreeMap<String, SiteRecord>>;

/// File-based document store with crash recovery
///
/// The whole file is loaded at construction and rewritten after every
/// successful update.
///
/// # Example
///
/// ```rust,no_run
/// use subsync_core::{DocumentStore, FileDocumentStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileDocumentStore::new("./sites.json").await?;
///     let sites = store.list_sites("sites").await?;
///     println!("{} site(s)", sites.len());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileDocumentStore {
    path: PathBuf,
    collections: Arc<RwLock<Collections>>,
}

/// Serializable store file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(default)]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    collections: Collections,
}

impl FileDocumentStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Try to load the existing file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start empty
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let collections = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            collections: Arc::new(RwLock::new(collections)),
        })
    }

    /// Load from file with automatic recovery
    async fn load_with_recovery(path: &Path) -> Result<Collections, Error> {
        match Self::load(path).await {
            Ok(collections) => {
                tracing::debug!("Loaded store file: {} collection(s)", collections.len());
                Ok(collections)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with an empty store.");
                    return Ok(HashMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(collections) => {
                        tracing::info!("Recovered store from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(collections)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with an empty store.",
                            backup_err
                        );
                        Ok(HashMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Collections, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.collections)
    }

    /// Write the store atomically
    async fn write(&self, collections: &Collections) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            updated_at: Some(chrono::Utc::now()),
            collections: collections.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await?;
            out.flush().await?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    /// Insert or replace a record and persist it
    pub async fn insert(&self, collection: &str, record: SiteRecord) -> Result<(), Error> {
        let mut guard = self.collections.write().await;
        let mut staged = guard.clone();
        staged
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record);
        self.write(&staged).await?;
        *guard = staged;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn list_sites(&self, collection: &str) -> Result<Vec<SiteRecord>, Error> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_site(&self, collection: &str, id: &str, patch: &SitePatch) -> Result<(), Error> {
        let mut guard = self.collections.write().await;
        // Memory only moves once the file has the change
        let mut staged = guard.clone();
        let record = staged
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| Error::store(format!("No document {}/{}", collection, id)))?;
        record.apply(patch);

        self.write(&staged).await?;
        *guard = staged;
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "file"
    }
}
