// # subsyncd
//
// Thin HTTP adapter over subsync-core:
// 1. Reading configuration from environment variables
// 2. Building the CRM client and the document store
// 3. Serving the reconciliation endpoint
//
// No reconciliation logic lives here.

pub mod config;
pub mod http;
pub mod store;

use anyhow::Result;
use std::sync::Arc;
use subsync_core::Reconciler;
use subsync_crm_sierra::SierraClient;

pub use config::Config;
pub use http::{AppState, router};

/// Build the shared application state from configuration
pub async fn build_state(config: &Config) -> Result<Arc<AppState>> {
    let sync = config.sync_config();

    let crm = SierraClient::new(&sync.crm).map_err(|e| anyhow::anyhow!("{}", e))?;
    let store = store::build_store(&sync.store).await?;
    let reconciler =
        Reconciler::new(Box::new(crm), store, &sync).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(Arc::new(AppState::new(reconciler)))
}
