//! Environment configuration
//!
//! Everything the handler needs is read from environment variables once at
//! startup. A missing or malformed value stops the process before it
//! listens.

use anyhow::{Context, Result};
use std::env;
use subsync_core::config::{DEFAULT_USERS_URL, DEFAULT_WEBHOOK_URL};
use subsync_core::{CrmConfig, StoreConfig, SyncConfig};
use tracing::Level;

/// Handler configuration
#[derive(Clone)]
pub struct Config {
    pub collection: String,
    pub handler_url: String,
    pub webhook_url: String,
    pub users_url: String,
    pub http_timeout_secs: u64,
    pub store_type: String,
    pub store_path: Option<String>,
    pub project_id: Option<String>,
    pub database: String,
    pub emulator_host: Option<String>,
    pub access_token: Option<String>,
    pub port: u16,
    pub log_level: String,
}

// Custom Debug implementation that hides the access token
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("collection", &self.collection)
            .field("handler_url", &self.handler_url)
            .field("webhook_url", &self.webhook_url)
            .field("users_url", &self.users_url)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("store_type", &self.store_type)
            .field("store_path", &self.store_path)
            .field("project_id", &self.project_id)
            .field("database", &self.database)
            .field("emulator_host", &self.emulator_host)
            .field("access_token", &self.access_token.as_ref().map(|_| "<REDACTED>"))
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let collection = get("FIRESTORE_COLLECTION").context(
            "FIRESTORE_COLLECTION is required. \
            Set it via: export FIRESTORE_COLLECTION=sites",
        )?;
        let handler_url = get("CF_HANDLER_URL").context(
            "CF_HANDLER_URL is required. \
            Set it via: export CF_HANDLER_URL=https://<region>-<project>.cloudfunctions.net/handler",
        )?;

        let http_timeout_secs = match get("SIERRA_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("SIERRA_HTTP_TIMEOUT_SECS must be a number of seconds. Got: {}", raw))?,
            None => 30,
        };

        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT must be a valid port number. Got: {}", raw))?,
            None => 8080,
        };

        Ok(Self {
            collection,
            handler_url,
            webhook_url: get("SIERRA_WEBHOOK_URL").unwrap_or_else(|| DEFAULT_WEBHOOK_URL.to_string()),
            users_url: get("SIERRA_USERS_URL").unwrap_or_else(|| DEFAULT_USERS_URL.to_string()),
            http_timeout_secs,
            store_type: get("SUBSYNC_STORE_TYPE").unwrap_or_else(|| "firestore".to_string()),
            store_path: get("SUBSYNC_STORE_PATH"),
            project_id: get("GOOGLE_CLOUD_PROJECT"),
            database: get("FIRESTORE_DATABASE").unwrap_or_else(|| "(default)".to_string()),
            emulator_host: get("FIRESTORE_EMULATOR_HOST"),
            access_token: get("FIRESTORE_ACCESS_TOKEN"),
            port,
            log_level: get("SUBSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.store_type.as_str() {
            "firestore" => {
                if self.project_id.is_none() {
                    anyhow::bail!(
                        "GOOGLE_CLOUD_PROJECT is required when SUBSYNC_STORE_TYPE=firestore"
                    );
                }
            }
            "file" => {
                if self.store_path.is_none() {
                    anyhow::bail!(
                        "SUBSYNC_STORE_PATH is required when SUBSYNC_STORE_TYPE=file. \
                        Set it via: export SUBSYNC_STORE_PATH=./sites.json"
                    );
                }
            }
            "memory" => {}
            _ => anyhow::bail!(
                "SUBSYNC_STORE_TYPE '{}' is not supported. \
                Supported types: firestore, file, memory",
                self.store_type
            ),
        }

        if self.port == 0 {
            anyhow::bail!("PORT must be between 1 and 65535");
        }

        if self.log_level().is_none() {
            anyhow::bail!(
                "SUBSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        self.sync_config()
            .validate()
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        Ok(())
    }

    /// Parsed log level
    pub fn log_level(&self) -> Option<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }

    /// Library configuration built from these settings
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            collection: self.collection.clone(),
            callback_url: self.handler_url.clone(),
            crm: CrmConfig {
                webhook_url: self.webhook_url.clone(),
                users_url: self.users_url.clone(),
                timeout_secs: self.http_timeout_secs,
            },
            store: self.store_config(),
        }
    }

    fn store_config(&self) -> StoreConfig {
        match self.store_type.as_str() {
            "firestore" => StoreConfig::Firestore {
                project_id: self.project_id.clone().unwrap_or_default(),
                database: self.database.clone(),
                emulator_host: self.emulator_host.clone(),
                access_token: self.access_token.clone(),
            },
            "file" => StoreConfig::File {
                path: self.store_path.clone().unwrap_or_default(),
            },
            _ => StoreConfig::Memory,
        }
    }
}
