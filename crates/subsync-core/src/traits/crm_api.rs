// # CRM API Trait
//
// Defines the interface to the CRM's webhook and user-directory endpoints.
//
// ## Implementations
//
// - Sierra Interactive: `subsync-crm-sierra` crate
//
// ## Usage
//
// ```rust,ignore
// use subsync_core::{ApiKey, CrmApi};
//
// let subscriptions = crm.list_subscriptions(&ApiKey::new("key")).await?;
// let banned = subscriptions.iter().any(|s| s.banned);
// ```

use async_trait::async_trait;

use crate::model::{ApiKey, DirectoryUser, Subscription, WebhookRegistration};

/// Trait for CRM API implementations
///
/// Every call is credentialed with the API key of the site being reconciled.
///
/// # Error contract
///
/// - A response with any status other than 200 is
///   [`Error::UpstreamStatus`](crate::Error::UpstreamStatus) carrying the code.
/// - A request that never got a response is
///   [`Error::Transport`](crate::Error::Transport).
/// - A 200 whose body cannot be understood is
///   [`Error::InvalidResponse`](crate::Error::InvalidResponse).
///
/// Implementations make exactly one HTTP request per call. They do not
/// retry, cache, or touch the document store; the reconciler decides what a
/// failure means for the site.
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// List the webhook subscriptions visible to this key
    async fn list_subscriptions(&self, api_key: &ApiKey) -> Result<Vec<Subscription>, crate::Error>;

    /// Register a webhook and return the id the CRM assigned to it
    async fn create_subscription(
        &self,
        api_key: &ApiKey,
        registration: &WebhookRegistration,
    ) -> Result<String, crate::Error>;

    /// Look up directory users by display name
    ///
    /// # Returns
    ///
    /// - `Ok(users)`: Zero or more directory records (the CRM matches loosely,
    ///   callers compare names themselves). A response without result data
    ///   is an empty list.
    /// - `Err(Error)`: Transport failure, non-200 status or unparseable body
    async fn find_users(&self, api_key: &ApiKey, name: &str) -> Result<Vec<DirectoryUser>, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
