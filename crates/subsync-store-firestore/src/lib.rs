// # Firestore Document Store
//
// This crate provides a `DocumentStore` over the Firestore REST API (v1).
//
// ## Operations
//
// - List: GET `documents/<collection>?pageSize=..&pageToken=..` until no
//   `nextPageToken` is returned
// - Update: POST `documents:commit` with one `update` write per patch
//   - `currentDocument.exists = true`, so a patch never creates a document
//   - `updateMask` names only the fields the patch sets
//   - admin ids are merged with an `appendMissingElements` transform
//
// ## Authentication
//
// See [`auth`]. The emulator takes unauthenticated requests.

pub mod auth;
pub mod value;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use subsync_core::config::StoreConfig;
use subsync_core::traits::DocumentStore;
use subsync_core::{Error, Result, SitePatch, SiteRecord};
use url::Url;

pub use auth::TokenSource;

/// Production Firestore endpoint
pub const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com";

/// Documents requested per list page
const PAGE_SIZE: u32 = 300;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Field holding the admin id list
const ADMIN_IDS_FIELD: &str = "allowedAdminUserIds";

/// Field holding the id -> display name map
const USERS_FIELD: &str = "availableUsers";

/// Firestore document store
pub struct FirestoreStore {
    /// API root, e.g. `https://firestore.googleapis.com`
    endpoint: Url,

    project_id: String,
    database: String,

    /// Bearer token source
    auth: TokenSource,

    /// HTTP client for API requests
    client: reqwest::Client,
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("project_id", &self.project_id)
            .field("database", &self.database)
            .field("auth", &self.auth)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreStore {
    /// Create a store from `StoreConfig::Firestore`
    ///
    /// An emulator host switches the endpoint to `http://<host>` and
    /// disables auth. Otherwise a configured access token is used as-is and
    /// the metadata server is asked when there is none.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let StoreConfig::Firestore {
            project_id,
            database,
            emulator_host,
            access_token,
        } = config
        else {
            return Err(Error::config("Invalid config for Firestore store"));
        };

        let (endpoint, auth) = match (emulator_host, access_token) {
            (Some(host), _) => {
                tracing::info!("Using Firestore emulator at {}", host);
                (format!("http://{}", host), TokenSource::None)
            }
            (None, Some(token)) => (FIRESTORE_API_BASE.to_string(), TokenSource::Static(token.clone())),
            (None, None) => (FIRESTORE_API_BASE.to_string(), TokenSource::metadata()),
        };

        Self::with_endpoint(&endpoint, project_id, database, auth)
    }

    /// Create a store against an explicit API root
    pub fn with_endpoint(endpoint: &str, project_id: &str, database: &str, auth: TokenSource) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("Invalid Firestore endpoint '{}': {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::config(format!("Invalid Firestore endpoint '{}'", endpoint)));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            project_id: project_id.to_string(),
            database: database.to_string(),
            auth,
            client,
        })
    }

    /// Name of the authentication source, for logging
    pub fn auth_kind(&self) -> &'static str {
        self.auth.kind()
    }

    /// Full resource name of a document
    fn document_name(&self, collection: &str, id: &str) -> String {
        format!(
            "projects/{}/databases/{}/documents/{}/{}",
            self.project_id, self.database, collection, id
        )
    }

    /// `<endpoint>/v1/projects/<p>/databases/<d>/<tail...>`
    fn api_url(&self, tail: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1", "projects", self.project_id.as_str(), "databases", self.database.as_str()])
                .extend(tail);
        }
        url
    }

    async fn authorized(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match self.auth.token(&self.client).await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    /// Build the commit write for a patch
    fn write_for(&self, collection: &str, id: &str, patch: &SitePatch) -> Value {
        let name = self.document_name(collection, id);

        match patch {
            SitePatch::Resubscribed { subscription_id } => {
                let mut fields = Map::new();
                fields.insert("subscriptionID".to_string(), json!(subscription_id));
                fields.insert("new_subscription".to_string(), json!(true));

                json!({
                    "update": {"name": name, "fields": value::encode_fields(&fields)},
                    "updateMask": {"fieldPaths": ["subscriptionID", "new_subscription"]},
                    "currentDocument": {"exists": true},
                })
            }
            SitePatch::GrantAdmin { user_id, name: display_name } => {
                let mut users = Map::new();
                users.insert(user_id.clone(), json!(display_name));
                let mut fields = Map::new();
                fields.insert(USERS_FIELD.to_string(), Value::Object(users));

                json!({
                    "update": {"name": name, "fields": value::encode_fields(&fields)},
                    "updateMask": {"fieldPaths": [value::field_path(&[USERS_FIELD, user_id.as_str()])]},
                    "updateTransforms": [{
                        "fieldPath": ADMIN_IDS_FIELD,
                        "appendMissingElements": {"values": [value::encode_value(&json!(user_id))]},
                    }],
                    "currentDocument": {"exists": true},
                })
            }
        }
    }
}

/// Turn a non-success response into a store error
async fn check(operation: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    Err(Error::store(format!(
        "Firestore {} returned HTTP {}: {}",
        operation,
        status.as_u16(),
        detail
    )))
}

/// Decode one listed document into a site record
fn site_from_document(document: Document) -> Result<SiteRecord> {
    let id = document
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::store(format!("Document name '{}' has no id", document.name)))?
        .to_string();

    let mut fields = value::decode_fields(&document.fields);
    fields.insert("id".to_string(), Value::String(id));

    serde_json::from_value(Value::Object(fields))
        .map_err(|e| Error::store(format!("Document {} could not be decoded: {}", document.name, e)))
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn list_sites(&self, collection: &str) -> Result<Vec<SiteRecord>> {
        let url = self.api_url(&["documents", collection]);
        let mut sites = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(url.clone())
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = self
                .authorized(request)
                .await?
                .send()
                .await
                .map_err(|e| Error::store(format!("Firestore list request failed: {}", e)))?;
            let page: ListPage = check("list", response)
                .await?
                .json()
                .await
                .map_err(|e| Error::store(format!("Firestore list response is malformed: {}", e)))?;

            for document in page.documents {
                sites.push(site_from_document(document)?);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        tracing::debug!("Listed {} document(s) from {}", sites.len(), collection);
        Ok(sites)
    }

    async fn update_site(&self, collection: &str, id: &str, patch: &SitePatch) -> Result<()> {
        let url = self.api_url(&["documents:commit"]);
        let body = json!({"writes": [self.write_for(collection, id, patch)]});

        let request = self.client.post(url).json(&body);
        let response = self
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(|e| Error::store(format!("Firestore commit request failed: {}", e)))?;
        check("commit", response).await?;

        tracing::debug!("Committed {:?} to {}/{}", patch, collection, id);
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "firestore"
    }
}
