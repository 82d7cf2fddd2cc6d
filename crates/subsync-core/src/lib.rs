// # subsync-core
//
// Core library for keeping site records in a document store in step with
// the webhook subscriptions and user permissions held by a CRM.
//
// ## Architecture Overview
//
// - **CrmApi**: Trait for the CRM webhook and user-directory endpoints
// - **DocumentStore**: Trait for listing and patching site records
// - **Reconciler**: Walks every site once per invocation and reports a RunOutcome
// - **SiteRecord / Admission**: Typed records and the checks that gate reconciliation
//
// ## Design Principles
//
// 1. **Separation of Concerns**: The loop knows nothing about HTTP or Firestore
// 2. **Partial Failure**: One site's failure never aborts the others
// 3. **Idempotency**: A second run against unchanged upstream state writes nothing
// 4. **Library-First**: The daemon is a thin adapter over this crate

pub mod config;
pub mod error;
pub mod model;
pub mod outcome;
pub mod reconcile;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{CrmConfig, StoreConfig, SyncConfig};
pub use error::{Error, Result};
pub use model::{
    Admission, AdmittedSite, ApiKey, DirectoryUser, SitePatch, SiteRecord, Subscription,
    WebhookRegistration,
};
pub use outcome::{OutcomeEntry, RunOutcome};
pub use reconcile::Reconciler;
pub use store::{FileDocumentStore, MemoryDocumentStore};
pub use traits::{CrmApi, DocumentStore};
