//! Access tokens for Firestore requests
//!
//! Three sources, picked once at startup:
//! - none, for the local emulator
//! - a static token from the environment
//! - the GCE metadata server, which is what Cloud Functions and Cloud Run
//!   provide; tokens are cached until shortly before they expire

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use subsync_core::{Error, Result};
use tokio::sync::Mutex;

/// Default service account token endpoint of the metadata server
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the reported expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Where bearer tokens come from
pub enum TokenSource {
    /// Requests carry no Authorization header
    None,

    /// A fixed token
    Static(String),

    /// Fetched from the metadata server and cached
    Metadata {
        url: String,
        cache: Mutex<Option<CachedToken>>,
    },
}

/// A token and the moment it stops being usable
#[derive(Clone)]
pub struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

// Custom Debug implementation that hides token values
impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::None => f.write_str("TokenSource::None"),
            TokenSource::Static(_) => f.write_str("TokenSource::Static(<REDACTED>)"),
            TokenSource::Metadata { url, .. } => {
                f.debug_struct("TokenSource::Metadata").field("url", url).finish()
            }
        }
    }
}

impl TokenSource {
    /// Metadata server at its well-known address
    pub fn metadata() -> Self {
        Self::metadata_at(METADATA_TOKEN_URL)
    }

    /// Metadata server at a custom address
    pub fn metadata_at(url: impl Into<String>) -> Self {
        TokenSource::Metadata {
            url: url.into(),
            cache: Mutex::new(None),
        }
    }

    /// Get a bearer token, if this source issues one
    pub async fn token(&self, client: &reqwest::Client) -> Result<Option<String>> {
        match self {
            TokenSource::None => Ok(None),
            TokenSource::Static(token) => Ok(Some(token.clone())),
            TokenSource::Metadata { url, cache } => {
                let mut cached = cache.lock().await;
                if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Utc::now()) {
                    return Ok(Some(token.token.clone()));
                }

                let fresh = fetch_metadata_token(client, url).await?;
                let token = fresh.token.clone();
                *cached = Some(fresh);
                Ok(Some(token))
            }
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            TokenSource::None => "none",
            TokenSource::Static(_) => "static",
            TokenSource::Metadata { .. } => "metadata",
        }
    }
}

async fn fetch_metadata_token(client: &reqwest::Client, url: &str) -> Result<CachedToken> {
    tracing::debug!("Fetching access token from metadata server");

    let response = client
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| Error::store(format!("Metadata server request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::store(format!(
            "Metadata server returned HTTP {}",
            status.as_u16()
        )));
    }

    let body: MetadataToken = response
        .json()
        .await
        .map_err(|e| Error::store(format!("Metadata server token is malformed: {}", e)))?;

    let lifetime = (body.expires_in - EXPIRY_MARGIN_SECS).max(0);
    Ok(CachedToken {
        token: body.access_token,
        expires_at: Utc::now() + Duration::seconds(lifetime),
    })
}
