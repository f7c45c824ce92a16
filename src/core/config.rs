use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use super::backoff::BackoffConfig;
use super::{WhitelistError, WhitelistResult};

const DEFAULT_USER_AGENT: &str = concat!("remote-whitelist/", env!("CARGO_PKG_VERSION"));

/// Serializes a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Bounds applied to a single crawl of a remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlLimits {
    pub max_depth: usize,
    pub max_requests: usize,
    pub concurrency: usize,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_requests: 500,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,
    #[serde(rename = "run_timeout_ms", with = "duration_ms")]
    pub run_timeout: Duration,
    pub crawl: CrawlLimits,
    #[serde(rename = "recheck_interval_ms", with = "duration_ms")]
    pub recheck_interval: Duration,
    #[serde(rename = "opt_out_recheck_interval_ms", with = "duration_ms")]
    pub opt_out_recheck_interval: Duration,
    #[serde(rename = "scheduler_tick_ms", with = "duration_ms")]
    pub scheduler_tick: Duration,
    pub workers: usize,
    pub backoff: BackoffConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: Vec::new(),
            request_timeout: Duration::from_secs(20),
            run_timeout: Duration::from_secs(300),
            crawl: CrawlLimits::default(),
            recheck_interval: Duration::from_secs(24 * 60 * 60),
            opt_out_recheck_interval: Duration::from_secs(7 * 24 * 60 * 60),
            scheduler_tick: Duration::from_secs(1),
            workers: 4,
            backoff: BackoffConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn with_headers(mut self, headers: Vec<(&str, &str)>) -> Self {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.crawl.max_depth = depth;
        self
    }

    pub fn with_max_requests(mut self, max_requests: usize) -> Self {
        self.crawl.max_requests = max_requests;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.crawl.concurrency = concurrency;
        self
    }

    pub fn with_recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval = interval;
        self
    }

    pub fn with_opt_out_recheck_interval(mut self, interval: Duration) -> Self {
        self.opt_out_recheck_interval = interval;
        self
    }

    pub fn with_scheduler_tick(mut self, tick: Duration) -> Self {
        self.scheduler_tick = tick;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn validate(&self) -> WhitelistResult<()> {
        if self.crawl.max_depth == 0 {
            return Err(WhitelistError::Config("crawl.max_depth must be at least 1".into()));
        }
        if self.crawl.max_requests == 0 {
            return Err(WhitelistError::Config("crawl.max_requests must be at least 1".into()));
        }
        if self.crawl.concurrency == 0 {
            return Err(WhitelistError::Config("crawl.concurrency must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(WhitelistError::Config("workers must be at least 1".into()));
        }
        if self.scheduler_tick.is_zero() {
            return Err(WhitelistError::Config("scheduler_tick_ms must be positive".into()));
        }
        self.backoff.validate()
    }
}

fn default_true() -> bool {
    true
}

/// A proxy repository as supplied by the repository configuration subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub id: String,
    pub remote_url: Url,
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,
}

impl RepositoryConfig {
    pub fn new(id: &str, remote_url: Url) -> Self {
        Self {
            id: id.to_string(),
            remote_url,
            discovery_enabled: true,
        }
    }

    pub fn with_discovery_enabled(mut self, enabled: bool) -> Self {
        self.discovery_enabled = enabled;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub discovery: DiscoveryConfig,
    pub storage_dir: Option<PathBuf>,
    pub repositories: Vec<RepositoryConfig>,
}

impl AppConfig {
    pub fn from_json(content: &str) -> WhitelistResult<Self> {
        let config: AppConfig = serde_json::from_str(content)?;
        config.discovery.validate()?;

        let mut seen = std::collections::HashSet::new();
        for repository in &config.repositories {
            if !seen.insert(repository.id.as_str()) {
                return Err(WhitelistError::Config(format!(
                    "duplicate repository id: {}",
                    repository.id
                )));
            }
        }

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> WhitelistResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
