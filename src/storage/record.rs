use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WhitelistStatus {
    Uninitialized,
    Discovering,
    Enabled,
    Disabled,
    Unsupported,
}

/// How the last completed discovery run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryOutcome {
    Scraped,
    OptedOut,
    ChainExhausted,
    DiscoveryDisabled,
    RootUnreachable,
    CrawlFailed,
    TimedOut,
}

impl DiscoveryOutcome {
    pub fn status(&self) -> WhitelistStatus {
        match self {
            DiscoveryOutcome::Scraped => WhitelistStatus::Enabled,
            DiscoveryOutcome::OptedOut
            | DiscoveryOutcome::ChainExhausted
            | DiscoveryOutcome::DiscoveryDisabled => WhitelistStatus::Disabled,
            DiscoveryOutcome::RootUnreachable
            | DiscoveryOutcome::CrawlFailed
            | DiscoveryOutcome::TimedOut => WhitelistStatus::Unsupported,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status() == WhitelistStatus::Unsupported
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixEntry {
    /// Segments below the remote root joined by `/`, e.g. `org` or `org/apache`.
    pub path: String,
    pub depth: usize,
    pub discovered_at: DateTime<Utc>,
}

impl PrefixEntry {
    pub fn new(path: &str, depth: usize, discovered_at: DateTime<Utc>) -> Self {
        Self {
            path: path.to_string(),
            depth,
            discovered_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistRecord {
    pub repository_id: String,
    pub remote_url: Url,
    pub status: WhitelistStatus,
    pub prefixes: BTreeMap<String, PrefixEntry>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_outcome: Option<DiscoveryOutcome>,
    pub scraper: Option<String>,
    pub remarks: Vec<String>,
}

/// Operator-facing summary of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryStatus {
    pub repository_id: String,
    pub remote_url: Url,
    pub status: WhitelistStatus,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub prefix_count: usize,
    pub scraper: Option<String>,
    pub last_outcome: Option<DiscoveryOutcome>,
}

// Transitions never mutate `self`: each returns the replacement record so the
// store can swap it in atomically.
impl WhitelistRecord {
    pub fn new(repository_id: &str, remote_url: Url) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            remote_url,
            status: WhitelistStatus::Uninitialized,
            prefixes: BTreeMap::new(),
            last_attempt_at: None,
            last_success_at: None,
            last_error: None,
            consecutive_failures: 0,
            last_outcome: None,
            scraper: None,
            remarks: Vec::new(),
        }
    }

    pub fn discovering(&self, at: DateTime<Utc>) -> Self {
        Self {
            status: WhitelistStatus::Discovering,
            last_attempt_at: Some(at),
            ..self.clone()
        }
    }

    pub fn enabled(
        &self,
        scraper: &str,
        prefixes: Vec<PrefixEntry>,
        at: DateTime<Utc>,
        remarks: Vec<String>,
    ) -> Self {
        Self {
            status: WhitelistStatus::Enabled,
            prefixes: prefixes
                .into_iter()
                .map(|entry| (entry.path.clone(), entry))
                .collect(),
            last_attempt_at: Some(at),
            last_success_at: Some(at),
            last_error: None,
            consecutive_failures: 0,
            last_outcome: Some(DiscoveryOutcome::Scraped),
            scraper: Some(scraper.to_string()),
            remarks,
            ..self.clone()
        }
    }

    /// `outcome` must map to `Disabled`.
    pub fn disabled(
        &self,
        outcome: DiscoveryOutcome,
        scraper: Option<&str>,
        at: DateTime<Utc>,
        remarks: Vec<String>,
    ) -> Self {
        debug_assert_eq!(outcome.status(), WhitelistStatus::Disabled);
        Self {
            status: outcome.status(),
            prefixes: BTreeMap::new(),
            last_attempt_at: Some(at),
            last_success_at: Some(at),
            last_error: None,
            consecutive_failures: 0,
            last_outcome: Some(outcome),
            scraper: scraper.map(str::to_string),
            remarks,
            ..self.clone()
        }
    }

    /// `outcome` must map to `Unsupported`. Prefixes are kept as they were.
    pub fn failed(
        &self,
        outcome: DiscoveryOutcome,
        error: &str,
        at: DateTime<Utc>,
        remarks: Vec<String>,
    ) -> Self {
        debug_assert_eq!(outcome.status(), WhitelistStatus::Unsupported);
        Self {
            status: outcome.status(),
            last_attempt_at: Some(at),
            last_error: Some(error.to_string()),
            consecutive_failures: self.consecutive_failures.saturating_add(1),
            last_outcome: Some(outcome),
            remarks,
            ..self.clone()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == WhitelistStatus::Enabled
    }

    pub fn contains_prefix(&self, path: &str) -> bool {
        self.prefixes.contains_key(path)
    }

    pub fn status_view(&self) -> DiscoveryStatus {
        DiscoveryStatus {
            repository_id: self.repository_id.clone(),
            remote_url: self.remote_url.clone(),
            status: self.status,
            last_attempt_at: self.last_attempt_at,
            last_success_at: self.last_success_at,
            last_error: self.last_error.clone(),
            consecutive_failures: self.consecutive_failures,
            prefix_count: self.prefixes.len(),
            scraper: self.scraper.clone(),
            last_outcome: self.last_outcome,
        }
    }
}
