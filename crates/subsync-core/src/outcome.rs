//! Per-invocation outcome aggregate
//!
//! A [`RunOutcome`] is built by one reconciliation run and handed back to
//! the caller. It is never persisted.

use serde::{Deserialize, Serialize};

/// One line of the outcome report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeEntry {
    pub site_name: String,
    #[serde(rename = "Client")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OutcomeEntry {
    pub fn new(site_name: impl Into<String>, client: Option<String>) -> Self {
        Self {
            site_name: site_name.into(),
            client,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Successes, failures and skipped records of one run, in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub successes: Vec<OutcomeEntry>,
    pub failures: Vec<OutcomeEntry>,
    pub skipped: Vec<OutcomeEntry>,
}

impl RunOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(&mut self, entry: OutcomeEntry) {
        self.successes.push(entry);
    }

    pub fn fail(&mut self, entry: OutcomeEntry) {
        self.failures.push(entry);
    }

    pub fn skip(&mut self, entry: OutcomeEntry) {
        self.skipped.push(entry);
    }

    /// Whether nothing failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line human summary
    pub fn summary(&self, records: usize) -> String {
        format!(
            "Processed {} site record(s): {} succeeded, {} failed, {} skipped",
            records,
            self.successes.len(),
            self.failures.len(),
            self.skipped.len()
        )
    }
}
