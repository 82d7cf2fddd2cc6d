//! Collaborator traits
//!
//! - [`CrmApi`]: Webhook subscriptions and user directory of the CRM
//! - [`DocumentStore`]: Site records and their incremental patches

pub mod crm_api;
pub mod document_store;

pub use crm_api::CrmApi;
pub use document_store::DocumentStore;
