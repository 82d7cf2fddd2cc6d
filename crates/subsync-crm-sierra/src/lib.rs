// # Sierra CRM Client
//
// This crate provides the Sierra Interactive implementation of `CrmApi`.
//
// ## Behavior
//
// - One HTTP request per trait call
// - Per-request timeout from `CrmConfig` (default 30 seconds)
// - Any status other than 200 becomes `Error::UpstreamStatus`
// - No retries, no caching, no background tasks
//
// ## Security
//
// - The site API key is only ever written to the `Sierra-ApiKey` header
// - The key never appears in logs or error messages
//
// ## API Reference
//
// - List webhooks: GET `<webhook-url>` -> `{"data": [{"id", "banned", ...}]}`
// - Create webhook: POST `<webhook-url>` with `{"eventTypes", "url", "exceptSystemName"}`
// - Find users: GET `<users-url>?name=<name>` -> `{"data": {"records": [{"id", "name"}]}}`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use subsync_core::config::CrmConfig;
use subsync_core::traits::CrmApi;
use subsync_core::{ApiKey, DirectoryUser, Error, Result, Subscription, WebhookRegistration};
use url::Url;

/// Header carrying the site credential
pub const API_KEY_HEADER: &str = "Sierra-ApiKey";

/// Sierra webhook and user-directory client
///
/// Holds no per-site state; the credential is passed on every call.
#[derive(Clone)]
pub struct SierraClient {
    /// Webhook listing/creation endpoint
    webhook_url: Url,

    /// User-directory lookup endpoint
    users_url: Url,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that skips the reqwest client internals
impl std::fmt::Debug for SierraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SierraClient")
            .field("webhook_url", &self.webhook_url.as_str())
            .field("users_url", &self.users_url.as_str())
            .finish()
    }
}

/// `{"data": [...]}` envelope of the webhook listing
#[derive(Debug, Deserialize)]
struct ListEnvelope {
    #[serde(default)]
    data: Option<Vec<Value>>,
}

/// `{"data": {"records": [...]}}` envelope of the user lookup
#[derive(Debug, Default, Deserialize)]
struct UsersEnvelope {
    #[serde(default)]
    data: Option<UsersPage>,
}

#[derive(Debug, Default, Deserialize)]
struct UsersPage {
    #[serde(default)]
    records: Option<Vec<Value>>,
}

impl SierraClient {
    /// Create a new client from validated CRM settings
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the endpoints or timeout are invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: &CrmConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Self::with_client(config, client)
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_client(config: &CrmConfig, client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            webhook_url: parse_endpoint("webhook", &config.webhook_url)?,
            users_url: parse_endpoint("users", &config.users_url)?,
            client,
        })
    }

    /// Send a request and decode a 200 JSON body
    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
        api_key: &ApiKey,
    ) -> Result<T> {
        let response = request
            .header(API_KEY_HEADER, api_key.expose())
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::transport(format!("{} request failed: {}", operation, e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::debug!("Sierra {} answered {}", operation, status);
            return Err(Error::upstream_status(operation, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::transport(format!("{} response could not be read: {}", operation, e)))?;

        serde_json::from_slice(&body).map_err(|e| {
            Error::invalid_response(format!("{} response is not valid JSON: {}", operation, e))
        })
    }
}

#[async_trait]
impl CrmApi for SierraClient {
    async fn list_subscriptions(&self, api_key: &ApiKey) -> Result<Vec<Subscription>> {
        let request = self.client.get(self.webhook_url.clone());
        let envelope: ListEnvelope = self.send("subscription listing", request, api_key).await?;

        let entries = envelope.data.unwrap_or_default();
        let total = entries.len();
        let subscriptions: Vec<Subscription> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();

        if subscriptions.len() < total {
            tracing::debug!(
                "Ignored {} webhook listing entries without a usable id",
                total - subscriptions.len()
            );
        }
        Ok(subscriptions)
    }

    async fn create_subscription(
        &self,
        api_key: &ApiKey,
        registration: &WebhookRegistration,
    ) -> Result<String> {
        tracing::debug!("Registering webhook callback {}", registration.url);

        let request = self
            .client
            .post(self.webhook_url.clone())
            .body(serde_json::to_vec(registration)?);
        let body: Value = self.send("subscription creation", request, api_key).await?;

        created_id(&body).ok_or_else(|| {
            Error::invalid_response("subscription creation response carries no id")
        })
    }

    async fn find_users(&self, api_key: &ApiKey, name: &str) -> Result<Vec<DirectoryUser>> {
        let request = self
            .client
            .get(self.users_url.clone())
            .query(&[("name", name)]);
        let envelope: UsersEnvelope = self.send("user lookup", request, api_key).await?;

        Ok(envelope
            .data
            .unwrap_or_default()
            .records
            .unwrap_or_default()
            .into_iter()
            .filter_map(|record| serde_json::from_value(record).ok())
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "sierra"
    }
}

/// New subscription id from a creation response
///
/// Accepts the id at the top level or under `data`, as a string or number.
fn created_id(body: &Value) -> Option<String> {
    [body.get("id"), body.get("data").and_then(|d| d.get("id"))]
        .into_iter()
        .flatten()
        .find_map(|id| match id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn parse_endpoint(what: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::config(format!("Invalid Sierra {} URL '{}': {}", what, raw, e)))
}
