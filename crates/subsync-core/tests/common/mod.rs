//! Test doubles and common utilities for reconciliation contract tests
//!
//! The CRM double answers from a script keyed by API key (and display name
//! for directory lookups) and logs every call. The store double wraps the
//! memory store and logs every patch. Both are `Clone` and share their logs,
//! so a test keeps one handle and gives the reconciler the other.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use subsync_core::error::Result;
use subsync_core::{
    ApiKey, CrmApi, DirectoryUser, DocumentStore, Error, MemoryDocumentStore, Reconciler,
    SitePatch, SiteRecord, Subscription, SyncConfig, WebhookRegistration,
};

pub const COLLECTION: &str = "sites";
pub const CALLBACK_URL: &str = "https://handler.example.com/callback";

/// One call made against the CRM double
#[derive(Debug, Clone, PartialEq)]
pub enum CrmCall {
    List { api_key: String },
    Create { api_key: String, registration: WebhookRegistration },
    FindUsers { api_key: String, name: String },
}

/// Scripted CRM API that records calls
#[derive(Clone, Default)]
pub struct ScriptedCrm {
    subscriptions: Arc<Mutex<HashMap<String, std::result::Result<Vec<Subscription>, u16>>>>,
    creations: Arc<Mutex<HashMap<String, std::result::Result<String, u16>>>>,
    unreachable_creations: Arc<Mutex<HashSet<String>>>,
    users: Arc<Mutex<HashMap<(String, String), std::result::Result<Vec<DirectoryUser>, u16>>>>,
    calls: Arc<Mutex<Vec<CrmCall>>>,
}

impl ScriptedCrm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriptions(self, api_key: &str, subscriptions: Vec<Subscription>) -> Self {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(api_key.to_string(), Ok(subscriptions));
        self
    }

    pub fn with_list_status(self, api_key: &str, status: u16) -> Self {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(api_key.to_string(), Err(status));
        self
    }

    pub fn with_created_id(self, api_key: &str, id: &str) -> Self {
        self.creations
            .lock()
            .unwrap()
            .insert(api_key.to_string(), Ok(id.to_string()));
        self
    }

    pub fn with_create_status(self, api_key: &str, status: u16) -> Self {
        self.creations
            .lock()
            .unwrap()
            .insert(api_key.to_string(), Err(status));
        self
    }

    /// Creation for `api_key` fails before any response arrives
    pub fn with_create_transport_error(self, api_key: &str) -> Self {
        self.unreachable_creations
            .lock()
            .unwrap()
            .insert(api_key.to_string());
        self
    }

    pub fn with_users(self, api_key: &str, name: &str, users: Vec<DirectoryUser>) -> Self {
        self.users
            .lock()
            .unwrap()
            .insert((api_key.to_string(), name.to_string()), Ok(users));
        self
    }

    pub fn with_users_status(self, api_key: &str, name: &str, status: u16) -> Self {
        self.users
            .lock()
            .unwrap()
            .insert((api_key.to_string(), name.to_string()), Err(status));
        self
    }

    pub fn calls(&self) -> Vec<CrmCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn list_calls(&self, api_key: &str) -> usize {
        self.count(|c| matches!(c, CrmCall::List { api_key: k } if k == api_key))
    }

    pub fn create_calls(&self, api_key: &str) -> usize {
        self.count(|c| matches!(c, CrmCall::Create { api_key: k, .. } if k == api_key))
    }

    pub fn find_calls(&self, api_key: &str) -> usize {
        self.count(|c| matches!(c, CrmCall::FindUsers { api_key: k, .. } if k == api_key))
    }

    pub fn registrations(&self) -> Vec<WebhookRegistration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                CrmCall::Create { registration, .. } => Some(registration),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&CrmCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: CrmCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CrmApi for ScriptedCrm {
    async fn list_subscriptions(&self, api_key: &ApiKey) -> Result<Vec<Subscription>> {
        self.record(CrmCall::List {
            api_key: api_key.expose().to_string(),
        });
        let scripted = self.subscriptions.lock().unwrap().get(api_key.expose()).cloned();
        match scripted {
            Some(Ok(subs)) => Ok(subs),
            Some(Err(status)) => Err(Error::upstream_status("subscription listing", status)),
            None => Ok(Vec::new()),
        }
    }

    async fn create_subscription(
        &self,
        api_key: &ApiKey,
        registration: &WebhookRegistration,
    ) -> Result<String> {
        self.record(CrmCall::Create {
            api_key: api_key.expose().to_string(),
            registration: registration.clone(),
        });
        if self.unreachable_creations.lock().unwrap().contains(api_key.expose()) {
            return Err(Error::transport("connection reset by peer"));
        }
        let scripted = self.creations.lock().unwrap().get(api_key.expose()).cloned();
        match scripted {
            Some(Ok(id)) => Ok(id),
            Some(Err(status)) => Err(Error::upstream_status("subscription creation", status)),
            None => Ok("new-subscription".to_string()),
        }
    }

    async fn find_users(&self, api_key: &ApiKey, name: &str) -> Result<Vec<DirectoryUser>> {
        self.record(CrmCall::FindUsers {
            api_key: api_key.expose().to_string(),
            name: name.to_string(),
        });
        let key = (api_key.expose().to_string(), name.to_string());
        let scripted = self.users.lock().unwrap().get(&key).cloned();
        match scripted {
            Some(Ok(users)) => Ok(users),
            Some(Err(status)) => Err(Error::upstream_status("user lookup", status)),
            None => Ok(Vec::new()),
        }
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// Memory store that records patches and can fail its read
#[derive(Clone, Default)]
pub struct RecordingStore {
    inner: MemoryDocumentStore,
    patches: Arc<Mutex<Vec<(String, SitePatch)>>>,
    list_call_count: Arc<AtomicUsize>,
    fail_list: Arc<AtomicBool>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, record: SiteRecord) {
        self.inner.insert(COLLECTION, record).await;
    }

    pub async fn get(&self, id: &str) -> Option<SiteRecord> {
        self.inner.get(COLLECTION, id).await
    }

    pub fn fail_reads(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn patches(&self) -> Vec<(String, SitePatch)> {
        self.patches.lock().unwrap().clone()
    }

    pub fn clear_patches(&self) {
        self.patches.lock().unwrap().clear();
    }

    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn list_sites(&self, collection: &str) -> Result<Vec<SiteRecord>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::store("permission denied"));
        }
        self.inner.list_sites(collection).await
    }

    async fn update_site(&self, collection: &str, id: &str, patch: &SitePatch) -> Result<()> {
        self.patches
            .lock()
            .unwrap()
            .push((id.to_string(), patch.clone()));
        self.inner.update_site(collection, id, patch).await
    }

    fn store_name(&self) -> &'static str {
        "recording"
    }
}

/// Build a reconciler over the given doubles
pub fn reconciler(crm: &ScriptedCrm, store: &RecordingStore) -> Reconciler {
    let config = SyncConfig::new(COLLECTION, CALLBACK_URL);
    Reconciler::new(Box::new(crm.clone()), Box::new(store.clone()), &config)
        .expect("reconciler construction succeeds")
}

/// A record that passes every admission check
pub fn site(id: &str, api_key: &str, subscription_id: &str, users: &[(&str, &str)]) -> SiteRecord {
    let mut available = Map::new();
    for (user_id, name) in users {
        available.insert(user_id.to_string(), json!(name));
    }

    let mut record = SiteRecord::new(id);
    record.client = Some(format!("Client {}", id));
    record.api_key = Some(api_key.to_string());
    record.subscription_id = Some(subscription_id.to_string());
    record.available_users = Some(available);
    record
}

pub fn subscription(id: &str, banned: bool) -> Subscription {
    Subscription {
        id: id.to_string(),
        banned,
    }
}

pub fn user(id: &str, name: &str) -> DirectoryUser {
    DirectoryUser {
        id: id.to_string(),
        name: Some(name.to_string()),
    }
}

pub fn users_value(pairs: &[(&str, &str)]) -> Value {
    Value::Object(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect(),
    )
}
