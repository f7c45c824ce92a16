use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{DiscoveryConfig, RepositoryConfig, WhitelistError, WhitelistResult};
use crate::http::HttpTransport;
use crate::scrapers::{ChainOutcome, ScrapeContext, ScraperChain};
use crate::stats::StatsTracker;
use crate::storage::{DiscoveryOutcome, DiscoveryStatus, WhitelistRecord, WhitelistStore};

struct Flight {
    generation: u64,
    cancel: CancellationToken,
}

/// Releases the single-flight slot when a run ends, unless a newer run
/// already took it over.
struct FlightGuard<'a> {
    in_flight: &'a DashMap<String, Flight>,
    repository_id: String,
    generation: u64,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(&self.repository_id, |_, flight| flight.generation == self.generation);
    }
}

/// A run's hold on the single-flight slot of its repository.
struct Claim<'a> {
    repository: RepositoryConfig,
    generation: u64,
    cancel: CancellationToken,
    _guard: FlightGuard<'a>,
}

/// Runs discovery for registered repositories and writes the results through
/// to the whitelist store.
///
/// At most one run per repository is in flight. Every write made on behalf of
/// a run is checked against the generation that owns the in-flight slot, so a
/// cancelled or superseded run can never overwrite newer state.
pub struct DiscoveryCoordinator {
    chain: Arc<ScraperChain>,
    transport: Arc<dyn HttpTransport>,
    store: Arc<WhitelistStore>,
    config: DiscoveryConfig,
    repositories: DashMap<String, RepositoryConfig>,
    in_flight: DashMap<String, Flight>,
    generation: AtomicU64,
    stats: Arc<StatsTracker>,
}

impl DiscoveryCoordinator {
    pub fn new(
        chain: Arc<ScraperChain>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<WhitelistStore>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            chain,
            transport,
            store,
            config,
            repositories: DashMap::new(),
            in_flight: DashMap::new(),
            generation: AtomicU64::new(0),
            stats: Arc::new(StatsTracker::new()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<StatsTracker>) -> Self {
        self.stats = stats;
        self
    }

    pub fn store(&self) -> &Arc<WhitelistStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Adds or replaces a repository. A stored record for a different remote
    /// (for instance one restored from disk) is reset.
    pub fn register(&self, repository: RepositoryConfig) {
        let id = repository.id.clone();
        let remote_url = repository.remote_url.clone();
        self.repositories.insert(id.clone(), repository);

        let stale = match self.store.get(&id) {
            Some(record) => record.remote_url != remote_url,
            None => true,
        };
        if stale {
            self.cancel(&id);
            self.store.put(WhitelistRecord::new(&id, remote_url.clone()));
        }
        info!("Registered repository {} ({})", id, remote_url);
    }

    /// Replaces the configuration of a known repository. Returns whether the
    /// remote URL changed, in which case any running discovery is cancelled
    /// and the record starts over.
    pub fn update(&self, repository: RepositoryConfig) -> WhitelistResult<bool> {
        let id = repository.id.clone();
        let remote_changed = {
            let mut current = self
                .repositories
                .get_mut(&id)
                .ok_or_else(|| WhitelistError::UnknownRepository(id.clone()))?;
            let changed = current.remote_url != repository.remote_url;
            *current = repository.clone();
            changed
        };

        if remote_changed {
            info!(
                "Remote of repository {} changed to {}, discarding its whitelist",
                id, repository.remote_url
            );
            self.cancel(&id);
            self.store
                .put(WhitelistRecord::new(&id, repository.remote_url));
        }
        Ok(remote_changed)
    }

    pub fn remove(&self, repository_id: &str) -> Option<RepositoryConfig> {
        let removed = self.repositories.remove(repository_id).map(|(_, r)| r);
        // Configuration first: a run claiming the slot after this cancel
        // finds no repository, and one claimed before it is cancelled.
        self.cancel(repository_id);
        self.store.remove(repository_id);
        if removed.is_some() {
            info!("Removed repository {}", repository_id);
        }
        removed
    }

    pub fn is_registered(&self, repository_id: &str) -> bool {
        self.repositories.contains_key(repository_id)
    }

    pub fn repository(&self, repository_id: &str) -> Option<RepositoryConfig> {
        self.repositories.get(repository_id).map(|r| r.clone())
    }

    pub fn repository_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.repositories.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_running(&self, repository_id: &str) -> bool {
        self.in_flight.contains_key(repository_id)
    }

    /// Cancels the in-flight run, if any, and frees its slot.
    pub fn cancel(&self, repository_id: &str) -> bool {
        match self.in_flight.remove(repository_id) {
            Some((_, flight)) => {
                debug!(
                    "Cancelling discovery of {} (generation {})",
                    repository_id, flight.generation
                );
                flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn status(&self, repository_id: &str) -> Option<DiscoveryStatus> {
        self.store.status(repository_id)
    }

    pub fn statuses(&self) -> Vec<DiscoveryStatus> {
        self.store.statuses()
    }

    /// Cancels whatever is running for the repository and discovers again.
    pub async fn force_recheck(&self, repository_id: &str) -> WhitelistResult<DiscoveryOutcome> {
        if !self.is_registered(repository_id) {
            return Err(WhitelistError::UnknownRepository(repository_id.to_string()));
        }
        if self.cancel(repository_id) {
            info!("Forced recheck of {} superseded a running discovery", repository_id);
        }
        self.run(repository_id).await
    }

    /// Takes the single-flight slot and only then reads the configuration.
    /// `remove` and `update` change the configuration before they cancel, so
    /// a slot taken after either of them sees the new configuration.
    fn claim(&self, repository_id: &str) -> WhitelistResult<Claim<'_>> {
        if !self.is_registered(repository_id) {
            return Err(WhitelistError::UnknownRepository(repository_id.to_string()));
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        match self.in_flight.entry(repository_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(WhitelistError::DiscoveryInProgress(repository_id.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(Flight {
                    generation,
                    cancel: cancel.clone(),
                });
            }
        }
        let guard = FlightGuard {
            in_flight: &self.in_flight,
            repository_id: repository_id.to_string(),
            generation,
        };

        let repository = self
            .repository(repository_id)
            .ok_or_else(|| WhitelistError::UnknownRepository(repository_id.to_string()))?;
        Ok(Claim {
            repository,
            generation,
            cancel,
            _guard: guard,
        })
    }

    /// Runs one discovery for the repository.
    pub async fn run(&self, repository_id: &str) -> WhitelistResult<DiscoveryOutcome> {
        let claim = self.claim(repository_id)?;
        let repository = &claim.repository;
        let generation = claim.generation;
        let cancel = &claim.cancel;

        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let current = self
            .store
            .get(repository_id)
            .map(|record| (*record).clone())
            .unwrap_or_else(|| WhitelistRecord::new(repository_id, repository.remote_url.clone()));

        if !repository.discovery_enabled {
            info!("[{}] Discovery disabled for {}", run_id, repository_id);
            let outcome = DiscoveryOutcome::DiscoveryDisabled;
            let record = current.disabled(
                outcome,
                None,
                started_at,
                vec!["discovery is disabled for this repository".to_string()],
            );
            if !self.write_if_current(repository_id, generation, record) {
                return Err(self.cancelled(run_id, repository_id));
            }
            self.stats
                .record_run(outcome, None, 0, 0, Utc::now() - started_at);
            return Ok(outcome);
        }

        info!(
            "[{}] Discovering {} at {}",
            run_id, repository_id, repository.remote_url
        );
        if !self.write_if_current(repository_id, generation, current.discovering(started_at)) {
            return Err(self.cancelled(run_id, repository_id));
        }

        let mut context = ScrapeContext::new(repository.remote_url.clone(), self.transport.as_ref())
            .with_limits(self.config.crawl.clone())
            .with_cancellation(cancel.clone())
            .with_started_at(started_at);

        let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(self.config.run_timeout, self.chain.scrape(&mut context)) => Some(result),
        };

        let chain_outcome = match finished {
            Some(result) => result,
            None => return Err(self.cancelled(run_id, repository_id)),
        };

        let requests = context.requests_issued();
        let bytes = context.bytes_downloaded();
        let mut remarks = context.into_remarks();

        let (outcome, scraper, record) = match chain_outcome {
            Ok(ChainOutcome::Scraped { scraper, prefixes }) => {
                let record = current.enabled(&scraper, prefixes, started_at, remarks);
                (DiscoveryOutcome::Scraped, Some(scraper), record)
            }
            Ok(ChainOutcome::OptedOut { scraper }) => {
                let outcome = DiscoveryOutcome::OptedOut;
                let record = current.disabled(outcome, Some(&scraper), started_at, remarks);
                (outcome, Some(scraper), record)
            }
            Ok(ChainOutcome::Exhausted) => {
                let outcome = DiscoveryOutcome::ChainExhausted;
                let record = current.disabled(outcome, None, started_at, remarks);
                (outcome, None, record)
            }
            Ok(ChainOutcome::RootUnreachable(reason)) => {
                let outcome = DiscoveryOutcome::RootUnreachable;
                let record = current.failed(outcome, &reason, started_at, remarks);
                (outcome, None, record)
            }
            Ok(ChainOutcome::CrawlFailed { scraper, failure }) => {
                let outcome = DiscoveryOutcome::CrawlFailed;
                let error = format!("{}: {}", scraper, failure);
                let record = current.failed(outcome, &error, started_at, remarks);
                (outcome, Some(scraper), record)
            }
            Ok(ChainOutcome::Cancelled) => return Err(self.cancelled(run_id, repository_id)),
            Err(_) => {
                let outcome = DiscoveryOutcome::TimedOut;
                let error = format!(
                    "discovery did not finish within {}ms",
                    self.config.run_timeout.as_millis()
                );
                remarks.push(error.clone());
                let record = current.failed(outcome, &error, started_at, remarks);
                (outcome, None, record)
            }
        };

        let failures = record.consecutive_failures;
        if !self.write_if_current(repository_id, generation, record) {
            return Err(self.cancelled(run_id, repository_id));
        }

        self.stats.record_run(
            outcome,
            scraper.as_deref(),
            requests,
            bytes,
            Utc::now() - started_at,
        );
        if outcome.is_failure() {
            warn!(
                "[{}] Discovery of {} failed with {:?} ({} consecutive failures)",
                run_id, repository_id, outcome, failures
            );
        } else {
            info!(
                "[{}] Discovery of {} finished with {:?} after {} requests",
                run_id, repository_id, outcome, requests
            );
        }
        Ok(outcome)
    }

    fn cancelled(&self, run_id: Uuid, repository_id: &str) -> WhitelistError {
        info!("[{}] Discovery of {} cancelled", run_id, repository_id);
        self.stats.record_cancelled();
        WhitelistError::Cancelled(repository_id.to_string())
    }

    /// Stores the record only while `generation` still owns the in-flight
    /// slot. The slot stays read-locked during the store write, so a
    /// concurrent `cancel` cannot slip in between check and write.
    fn write_if_current(&self, repository_id: &str, generation: u64, record: WhitelistRecord) -> bool {
        let flight = match self.in_flight.get(repository_id) {
            Some(flight) => flight,
            None => return false,
        };
        if flight.generation != generation || flight.cancel.is_cancelled() {
            return false;
        }
        self.store.put(record);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockTransport;
    use url::Url;

    const REPO: &str = "central";

    fn coordinator() -> DiscoveryCoordinator {
        let coordinator = DiscoveryCoordinator::new(
            Arc::new(ScraperChain::default()),
            Arc::new(MockTransport::new()),
            Arc::new(WhitelistStore::new()),
            DiscoveryConfig::default(),
        );
        coordinator.register(RepositoryConfig::new(
            REPO,
            Url::parse("http://repo.example.com/maven2/").unwrap(),
        ));
        coordinator
    }

    #[test]
    fn test_removal_cancels_slot_claimed_before_it() {
        let coordinator = coordinator();
        let claim = coordinator.claim(REPO).unwrap();

        coordinator.remove(REPO);

        assert!(claim.cancel.is_cancelled());
        let record = WhitelistRecord::new(REPO, claim.repository.remote_url.clone())
            .discovering(Utc::now());
        assert!(!coordinator.write_if_current(REPO, claim.generation, record));
        assert!(coordinator.store().get(REPO).is_none());
    }

    #[tokio::test]
    async fn test_run_after_removal_writes_nothing() {
        let coordinator = coordinator();
        coordinator.remove(REPO);

        assert!(matches!(
            coordinator.claim(REPO),
            Err(WhitelistError::UnknownRepository(_))
        ));
        assert!(matches!(
            coordinator.run(REPO).await,
            Err(WhitelistError::UnknownRepository(_))
        ));
        assert!(!coordinator.is_running(REPO));
        assert!(coordinator.store().get(REPO).is_none());
    }

    #[test]
    fn test_claim_sees_configuration_updated_before_it() {
        let coordinator = coordinator();
        let mirror = Url::parse("http://mirror.example.com/maven2/").unwrap();
        coordinator
            .update(RepositoryConfig::new(REPO, mirror.clone()))
            .unwrap();

        let claim = coordinator.claim(REPO).unwrap();
        assert_eq!(claim.repository.remote_url, mirror);
        assert!(matches!(
            coordinator.claim(REPO),
            Err(WhitelistError::DiscoveryInProgress(_))
        ));

        drop(claim);
        assert!(!coordinator.is_running(REPO));
    }
}
