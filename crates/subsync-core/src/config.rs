//! Configuration types for subsync
//!
//! This module defines the configuration structures passed into the
//! reconciler and the integration crates. Values are constructed once at
//! process start; nothing here reads the environment.

use serde::{Deserialize, Serialize};
use url::Url;

/// Default CRM webhook endpoint
pub const DEFAULT_WEBHOOK_URL: &str = "https://api.sierrainteractivedev.com/webhook";

/// Default CRM user-directory endpoint
pub const DEFAULT_USERS_URL: &str = "https://api.sierrainteractivedev.com/users";

/// Main subsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Name of the document store collection holding site records
    pub collection: String,

    /// Externally reachable base URL the CRM calls back on
    pub callback_url: String,

    /// CRM endpoint settings
    #[serde(default)]
    pub crm: CrmConfig,

    /// Document store settings
    #[serde(default)]
    pub store: StoreConfig,
}

impl SyncConfig {
    /// Create a configuration with default CRM and store settings
    pub fn new(collection: impl Into<String>, callback_url: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            callback_url: callback_url.into(),
            crm: CrmConfig::default(),
            store: StoreConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.collection.trim().is_empty() {
            return Err(crate::Error::config("Collection name cannot be empty"));
        }

        self.parsed_callback_url()?;
        self.crm.validate()?;
        self.store.validate()?;

        Ok(())
    }

    /// Parse the callback base URL
    pub fn parsed_callback_url(&self) -> Result<Url, crate::Error> {
        parse_http_url("Callback URL", &self.callback_url)
    }
}

/// CRM endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Webhook listing/creation endpoint
    #[serde(default = "default_webhook_url")]
    pub webhook_url: String,

    /// User-directory lookup endpoint
    #[serde(default = "default_users_url")]
    pub users_url: String,

    /// Per-request timeout (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl CrmConfig {
    /// Validate the CRM configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        parse_http_url("CRM webhook URL", &self.webhook_url)?;
        parse_http_url("CRM users URL", &self.users_url)?;

        if !(1..=300).contains(&self.timeout_secs) {
            return Err(crate::Error::config(format!(
                "CRM timeout must be between 1 and 300 seconds, got {}",
                self.timeout_secs
            )));
        }

        Ok(())
    }
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            webhook_url: default_webhook_url(),
            users_url: default_users_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Document store configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Firestore over its REST API
    Firestore {
        /// Google Cloud project id
        project_id: String,
        /// Database id, usually "(default)"
        #[serde(default = "default_database")]
        database: String,
        /// `host:port` of a local emulator (disables auth)
        emulator_host: Option<String>,
        /// Static bearer token; the metadata server is used when absent
        #[serde(skip_serializing)]
        access_token: Option<String>,
    },

    /// JSON file on local disk
    File {
        /// Path to the JSON file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

// Custom Debug implementation that hides the access token
impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreConfig::Firestore {
                project_id,
                database,
                emulator_host,
                access_token,
            } => f
                .debug_struct("Firestore")
                .field("project_id", project_id)
                .field("database", database)
                .field("emulator_host", emulator_host)
                .field("access_token", &access_token.as_ref().map(|_| "<REDACTED>"))
                .finish(),
            StoreConfig::File { path } => f.debug_struct("File").field("path", path).finish(),
            StoreConfig::Memory => f.write_str("Memory"),
        }
    }
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::Firestore {
                project_id,
                database,
                ..
            } => {
                if project_id.is_empty() {
                    return Err(crate::Error::config("Firestore project id cannot be empty"));
                }
                if database.is_empty() {
                    return Err(crate::Error::config("Firestore database cannot be empty"));
                }
                Ok(())
            }
            StoreConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("File store path cannot be empty"));
                }
                Ok(())
            }
            StoreConfig::Memory => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &'static str {
        match self {
            StoreConfig::Firestore { .. } => "firestore",
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
        }
    }
}

fn parse_http_url(what: &str, raw: &str) -> Result<Url, crate::Error> {
    let url = Url::parse(raw)
        .map_err(|e| crate::Error::config(format!("{} '{}' is not a valid URL: {}", what, raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(crate::Error::config(format!(
            "{} must use http or https, got '{}'",
            what, other
        ))),
    }
}

fn default_webhook_url() -> String {
    DEFAULT_WEBHOOK_URL.to_string()
}

fn default_users_url() -> String {
    DEFAULT_USERS_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_database() -> String {
    "(default)".to_string()
}
