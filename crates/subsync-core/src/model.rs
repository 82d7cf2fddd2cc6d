//! Domain types for site records and the CRM entities they reference
//!
//! Store documents are decoded into [`SiteRecord`] using the field names the
//! documents carry (`apiKey`, `subscriptionID`, ...). [`SiteRecord::admit`]
//! turns a raw record into an [`AdmittedSite`] or a terminal disposition.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use url::form_urlencoded;

/// Event type every site subscribes to
pub const WEBHOOK_EVENT_TYPE: &str = "LeadCommunicationLogged";

/// CRM system whose own events are excluded from the webhook
pub const EXCLUDED_SYSTEM_NAME: &str = "Automations";

/// Query parameter the callback handler reads the site from
pub const SITE_NAME_PARAM: &str = "site_name";

/// One site document from the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    /// Document id, also the site name
    pub id: String,

    /// Human-readable label
    #[serde(
        rename = "Client",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub client: Option<String>,

    /// Credential for CRM calls scoped to this site
    #[serde(
        rename = "apiKey",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<String>,

    /// Id of the webhook subscription created for this site
    #[serde(
        rename = "subscriptionID",
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub subscription_id: Option<String>,

    /// External user id -> display name
    #[serde(
        rename = "availableUsers",
        default,
        deserialize_with = "lenient_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub available_users: Option<Map<String, Value>>,

    /// External user ids already granted admin rights
    #[serde(
        rename = "allowedAdminUserIds",
        default,
        deserialize_with = "lenient_id_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub allowed_admin_user_ids: Vec<String>,

    /// Set when the subscription was recreated by a run
    #[serde(
        rename = "new_subscription",
        default,
        deserialize_with = "lenient_opt_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub new_subscription: Option<bool>,
}

/// Result of the admission checks for one record
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Record may be reconciled
    Admitted(AdmittedSite),
    /// Record is deliberately left alone
    Skipped { reason: String },
    /// Record cannot be reconciled
    Rejected { reason: String },
}

/// A site record that passed every admission check
#[derive(Debug, Clone, PartialEq)]
pub struct AdmittedSite {
    pub site_name: String,
    pub client: Option<String>,
    pub api_key: ApiKey,
    pub subscription_id: String,
    /// Distinct display names, in first-seen order
    pub user_names: Vec<String>,
    pub allowed_admin_user_ids: BTreeSet<String>,
}

impl SiteRecord {
    /// Create a record with only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Run the admission checks
    ///
    /// Order matters: a missing subscription id skips the record before any
    /// other field is looked at.
    pub fn admit(&self) -> Admission {
        let Some(subscription_id) = non_empty(&self.subscription_id) else {
            return Admission::Skipped {
                reason: "Missing subscriptionID".to_string(),
            };
        };

        let Some(api_key) = non_empty(&self.api_key) else {
            return Admission::Rejected {
                reason: "Missing apiKey".to_string(),
            };
        };

        let users = match &self.available_users {
            Some(users) if !users.is_empty() => users,
            _ => {
                return Admission::Rejected {
                    reason: "availableUsers is missing or empty".to_string(),
                };
            }
        };

        let user_names = distinct_names(users);
        if user_names.is_empty() {
            return Admission::Rejected {
                reason: "availableUsers has no string-valued entries".to_string(),
            };
        }

        Admission::Admitted(AdmittedSite {
            site_name: self.id.clone(),
            client: self.client.clone(),
            api_key: ApiKey::new(api_key),
            subscription_id: subscription_id.to_string(),
            user_names,
            allowed_admin_user_ids: self.allowed_admin_user_ids.iter().cloned().collect(),
        })
    }

    /// Apply a patch the same way a store would
    pub fn apply(&mut self, patch: &SitePatch) {
        match patch {
            SitePatch::Resubscribed { subscription_id } => {
                self.subscription_id = Some(subscription_id.clone());
                self.new_subscription = Some(true);
            }
            SitePatch::GrantAdmin { user_id, name } => {
                if !self.allowed_admin_user_ids.contains(user_id) {
                    self.allowed_admin_user_ids.push(user_id.clone());
                }
                self.available_users
                    .get_or_insert_with(Map::new)
                    .insert(user_id.clone(), Value::String(name.clone()));
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn distinct_names(users: &Map<String, Value>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    users
        .values()
        .filter_map(Value::as_str)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

/// A site's CRM credential
///
/// Never printed: `Debug` redacts the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for the request header only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<REDACTED>)")
    }
}

/// A webhook subscription as listed by the CRM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub banned: bool,
}

/// A user record from the CRM directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
}

/// Body of a webhook creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub event_types: Vec<String>,
    pub url: String,
    pub except_system_name: String,
}

impl WebhookRegistration {
    /// Registration pointing the CRM at `<callback>?site_name=<site>`
    ///
    /// The callback base is used exactly as configured; only the site name
    /// is form-encoded.
    pub fn for_site(callback: &str, site_name: &str) -> Self {
        let separator = if callback.contains('?') { '&' } else { '?' };
        let encoded: String = form_urlencoded::byte_serialize(site_name.as_bytes()).collect();

        Self {
            event_types: vec![WEBHOOK_EVENT_TYPE.to_string()],
            url: format!("{}{}{}={}", callback, separator, SITE_NAME_PARAM, encoded),
            except_system_name: EXCLUDED_SYSTEM_NAME.to_string(),
        }
    }
}

/// Incremental update applied to one site document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SitePatch {
    /// Store the replacement subscription id and mark it fresh
    Resubscribed { subscription_id: String },
    /// Union `user_id` into the admin ids and record its display name
    GrantAdmin { user_id: String, name: String },
}

/// Render a JSON scalar id as a string
pub(crate) fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or number id, got {}", value)))
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(id_from_value(&value))
}

fn lenient_id_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(id_from_value).collect(),
        _ => Vec::new(),
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Map<String, Value>>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(map) => Some(map),
        _ => None,
    })
}

fn lenient_opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_bool())
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_bool().unwrap_or(false))
}
