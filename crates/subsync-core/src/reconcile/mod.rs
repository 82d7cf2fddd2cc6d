//! Site reconciliation loop
//!
//! The Reconciler is responsible for:
//! - Reading every site record from the DocumentStore
//! - Running the admission checks on each record
//! - Replacing banned webhook subscriptions via the CrmApi
//! - Granting admin rights to newly resolved directory users
//! - Collecting a RunOutcome without letting one site abort the others
//!
//! ## Flow per site
//!
//! ```text
//!  SiteRecord ──admit()──┬── Skipped ──────────────────────────► skipped
//!                        ├── Rejected ─────────────────────────► failures
//!                        └── Admitted
//!                               │
//!                  list_subscriptions ── error ────────────────► failures (stop)
//!                               │
//!                   banned match? ── yes ── create_subscription
//!                               │              │ error ────────► failures (stop)
//!                               │              └ update_site ──► successes
//!                               ▼
//!               for each name: find_users ── error/empty ──────► failures (next name)
//!                               └ new ids ── update_site (GrantAdmin)
//! ```
//!
//! Everything runs sequentially on the caller's task. Nothing is retried.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::model::{Admission, AdmittedSite, SitePatch, SiteRecord, WebhookRegistration};
use crate::outcome::{OutcomeEntry, RunOutcome};
use crate::traits::{CrmApi, DocumentStore};

/// Whether the user step may run after the subscription step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriptionStep {
    Continue,
    Stop,
}

/// Reconciles site records against the CRM
///
/// Construct once at startup and share; a run holds no state between
/// invocations beyond what it writes to the store.
pub struct Reconciler {
    /// CRM API for subscriptions and the user directory
    crm: Box<dyn CrmApi>,

    /// Store holding the site records
    store: Box<dyn DocumentStore>,

    /// Collection to reconcile
    collection: String,

    /// Base URL the CRM calls back on
    callback_url: String,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Parameters
    ///
    /// - `crm`: CRM API implementation
    /// - `store`: Document store implementation
    /// - `config`: Validated configuration
    pub fn new(crm: Box<dyn CrmApi>, store: Box<dyn DocumentStore>, config: &SyncConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            crm,
            store,
            collection: config.collection.clone(),
            callback_url: config.callback_url.clone(),
        })
    }

    /// Name of the collection this reconciler reads
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Process every record in the collection once
    ///
    /// # Returns
    ///
    /// - `Ok((records, outcome))`: Number of records read and the itemized outcome
    /// - `Err(Error)`: The collection itself could not be read; nothing was processed
    pub async fn run(&self) -> Result<(usize, RunOutcome)> {
        let sites = self.store.list_sites(&self.collection).await?;
        info!(
            "Reconciling {} site record(s) from {} collection '{}'",
            sites.len(),
            self.store.store_name(),
            self.collection
        );

        let mut outcome = RunOutcome::new();
        for site in &sites {
            self.reconcile_site(site, &mut outcome).await;
        }

        if outcome.is_clean() {
            info!("{}", outcome.summary(sites.len()));
        } else {
            warn!("{}", outcome.summary(sites.len()));
        }
        Ok((sites.len(), outcome))
    }

    /// Reconcile a single record, recording every disposition in `outcome`
    async fn reconcile_site(&self, record: &SiteRecord, outcome: &mut RunOutcome) {
        let site = match record.admit() {
            Admission::Admitted(site) => site,
            Admission::Skipped { reason } => {
                info!("Skipping site {}: {}", record.id, reason);
                outcome.skip(OutcomeEntry::new(&record.id, record.client.clone()).with_reason(reason));
                return;
            }
            Admission::Rejected { reason } => {
                warn!("Site {} failed admission: {}", record.id, reason);
                outcome.fail(OutcomeEntry::new(&record.id, record.client.clone()).with_reason(reason));
                return;
            }
        };

        if self.reconcile_subscription(&site, outcome).await == SubscriptionStep::Stop {
            return;
        }

        self.reconcile_users(&site, outcome).await;
    }

    /// Replace the site's subscription if the CRM has banned it
    async fn reconcile_subscription(&self, site: &AdmittedSite, outcome: &mut RunOutcome) -> SubscriptionStep {
        let subscriptions = match self.crm.list_subscriptions(&site.api_key).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                let reason = match e.status_code() {
                    Some(status) => format!("Failed to fetch subscriptions (status {})", status),
                    None => format!("Subscription listing failed: {}", e),
                };
                warn!("Site {}: {}", site.site_name, reason);
                outcome.fail(entry(site).with_reason(reason));
                return SubscriptionStep::Stop;
            }
        };
        debug!(
            "Site {}: {} subscription(s) listed by {}",
            site.site_name,
            subscriptions.len(),
            self.crm.provider_name()
        );

        let banned = subscriptions
            .iter()
            .any(|s| s.banned && s.id == site.subscription_id);
        if !banned {
            debug!("Site {}: subscription {} is healthy", site.site_name, site.subscription_id);
            return SubscriptionStep::Continue;
        }

        info!(
            "Site {}: subscription {} is banned, creating a replacement",
            site.site_name, site.subscription_id
        );
        let registration = WebhookRegistration::for_site(&self.callback_url, &site.site_name);

        let new_id = match self.crm.create_subscription(&site.api_key, &registration).await {
            Ok(id) => id,
            Err(e) => {
                let reason = match e.status_code() {
                    Some(status) => format!("Failed to create new subscription (status {})", status),
                    None => format!("Subscription creation failed: {}", e),
                };
                warn!("Site {}: {}", site.site_name, reason);
                outcome.fail(entry(site).with_reason(reason));
                return SubscriptionStep::Stop;
            }
        };

        let patch = SitePatch::Resubscribed {
            subscription_id: new_id.clone(),
        };
        if let Err(e) = self.store.update_site(&self.collection, &site.site_name, &patch).await {
            let reason = format!("Created subscription {} but failed to store it: {}", new_id, e);
            warn!("Site {}: {}", site.site_name, reason);
            outcome.fail(entry(site).with_reason(reason));
            return SubscriptionStep::Stop;
        }

        info!(
            "Site {}: replaced banned subscription {} with {}",
            site.site_name, site.subscription_id, new_id
        );
        outcome.succeed(entry(site).with_reason(format!(
            "Replaced banned subscription {} with {}",
            site.subscription_id, new_id
        )));
        SubscriptionStep::Continue
    }

    /// Resolve display names and grant admin rights to ids not yet granted
    ///
    /// A failed lookup only affects its own name.
    async fn reconcile_users(&self, site: &AdmittedSite, outcome: &mut RunOutcome) {
        let mut granted: BTreeSet<String> = site.allowed_admin_user_ids.clone();

        for name in &site.user_names {
            let users = match self.crm.find_users(&site.api_key, name).await {
                Ok(users) if users.is_empty() => {
                    let reason = format!("User lookup for '{}' returned no records", name);
                    warn!("Site {}: {}", site.site_name, reason);
                    outcome.fail(entry(site).with_reason(reason));
                    continue;
                }
                Ok(users) => users,
                Err(e) => {
                    let reason = match e.status_code() {
                        Some(status) => format!("User lookup for '{}' failed (status {})", name, status),
                        None => format!("User lookup for '{}' failed: {}", name, e),
                    };
                    warn!("Site {}: {}", site.site_name, reason);
                    outcome.fail(entry(site).with_reason(reason));
                    continue;
                }
            };

            for user in users {
                if user.name.as_deref() != Some(name.as_str()) || granted.contains(&user.id) {
                    continue;
                }

                let patch = SitePatch::GrantAdmin {
                    user_id: user.id.clone(),
                    name: name.clone(),
                };
                match self.store.update_site(&self.collection, &site.site_name, &patch).await {
                    Ok(()) => {
                        info!("Site {}: granted admin rights to {} ({})", site.site_name, name, user.id);
                        granted.insert(user.id);
                    }
                    Err(e) => {
                        let reason = format!("Failed to grant admin rights to '{}' ({}): {}", name, user.id, e);
                        warn!("Site {}: {}", site.site_name, reason);
                        outcome.fail(entry(site).with_reason(reason));
                    }
                }
            }
        }
    }
}

fn entry(site: &AdmittedSite) -> OutcomeEntry {
    OutcomeEntry::new(&site.site_name, site.client.clone())
}
