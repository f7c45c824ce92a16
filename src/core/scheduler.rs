use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{DiscoveryConfig, DiscoveryCoordinator, RepositoryConfig, WhitelistError, WhitelistResult};
use crate::storage::{DiscoveryOutcome, WhitelistRecord, WhitelistStatus};

/// Changes reported by the repository configuration subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryEvent {
    Created(RepositoryConfig),
    Updated(RepositoryConfig),
    Deleted(String),
    ForceRecheck(String),
}

/// How long to wait before the next discovery of a repository in this state.
/// `None` means nothing is scheduled until an event says otherwise.
pub fn next_delay(config: &DiscoveryConfig, record: &WhitelistRecord) -> Option<Duration> {
    match record.status {
        WhitelistStatus::Uninitialized => Some(Duration::ZERO),
        // The run in progress reschedules when it ends.
        WhitelistStatus::Discovering => None,
        WhitelistStatus::Enabled => Some(config.recheck_interval),
        WhitelistStatus::Disabled => match record.last_outcome {
            Some(DiscoveryOutcome::OptedOut) => Some(config.opt_out_recheck_interval),
            Some(DiscoveryOutcome::DiscoveryDisabled) => None,
            _ => Some(config.recheck_interval),
        },
        WhitelistStatus::Unsupported => Some(config.backoff.delay_for(record.consecutive_failures)),
    }
}

/// Drives discovery runs: immediately for new or re-pointed repositories,
/// periodically afterwards, and with backoff while a remote keeps failing.
pub struct DiscoveryScheduler {
    coordinator: Arc<DiscoveryCoordinator>,
    due: Arc<Mutex<HashMap<String, Instant>>>,
    workers: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl DiscoveryScheduler {
    pub fn new(coordinator: Arc<DiscoveryCoordinator>) -> Self {
        let workers = coordinator.config().workers.max(1);
        Self {
            coordinator,
            due: Arc::new(Mutex::new(HashMap::new())),
            workers: Arc::new(Semaphore::new(workers)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn coordinator(&self) -> &Arc<DiscoveryCoordinator> {
        &self.coordinator
    }

    pub fn due_at(&self, repository_id: &str) -> Option<Instant> {
        self.due.lock().get(repository_id).copied()
    }

    pub fn schedule_now(&self, repository_id: &str) {
        self.due
            .lock()
            .insert(repository_id.to_string(), Instant::now());
    }

    /// Schedules every registered repository from its stored state. Records
    /// restored from disk are due once their interval, counted from the last
    /// attempt, has passed.
    pub fn schedule_registered(&self) {
        let now = Instant::now();
        let wall_now = chrono::Utc::now();
        let config = self.coordinator.config();
        let store = self.coordinator.store();

        let mut due = self.due.lock();
        for id in self.coordinator.repository_ids() {
            let delay = match store.get(&id) {
                Some(record) => {
                    let elapsed = record
                        .last_attempt_at
                        .and_then(|at| (wall_now - at).to_std().ok())
                        .unwrap_or_default();
                    next_delay(config, &record).map(|d| d.saturating_sub(elapsed))
                }
                None => Some(Duration::ZERO),
            };
            match delay {
                Some(delay) => {
                    due.insert(id, now + delay);
                }
                None => {
                    due.remove(&id);
                }
            }
        }
    }

    pub fn handle_event(&self, event: RepositoryEvent) -> WhitelistResult<()> {
        match event {
            RepositoryEvent::Created(repository) => {
                let id = repository.id.clone();
                self.coordinator.register(repository);
                self.schedule_now(&id);
            }
            RepositoryEvent::Updated(repository) => {
                let id = repository.id.clone();
                let was_enabled = self
                    .coordinator
                    .repository(&id)
                    .map(|r| r.discovery_enabled);
                let now_enabled = repository.discovery_enabled;
                let remote_changed = self.coordinator.update(repository)?;
                if remote_changed || was_enabled != Some(now_enabled) {
                    self.schedule_now(&id);
                }
            }
            RepositoryEvent::Deleted(id) => {
                self.due.lock().remove(&id);
                self.coordinator.remove(&id);
            }
            RepositoryEvent::ForceRecheck(id) => {
                if !self.coordinator.is_registered(&id) {
                    return Err(WhitelistError::UnknownRepository(id));
                }
                self.due.lock().remove(&id);
                // Cancel right away rather than once a worker is free.
                self.coordinator.cancel(&id);
                self.spawn_run(id, true);
            }
        }
        Ok(())
    }

    /// Removes and returns the repositories whose due time has passed.
    pub fn due_repositories(&self, now: Instant) -> Vec<String> {
        let mut due = self.due.lock();
        let ready: Vec<String> = due
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ready {
            due.remove(id);
        }
        ready
    }

    pub fn dispatch_due(&self) -> Vec<JoinHandle<()>> {
        self.due_repositories(Instant::now())
            .into_iter()
            .map(|id| self.spawn_run(id, false))
            .collect()
    }

    fn spawn_run(&self, repository_id: String, force: bool) -> JoinHandle<()> {
        let coordinator = Arc::clone(&self.coordinator);
        let due = Arc::clone(&self.due);
        let workers = Arc::clone(&self.workers);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let _permit = tokio::select! {
                _ = shutdown.cancelled() => return,
                permit = workers.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let result = if force {
                coordinator.force_recheck(&repository_id).await
            } else {
                coordinator.run(&repository_id).await
            };

            match &result {
                Ok(outcome) => debug!("Scheduled discovery of {} ended with {:?}", repository_id, outcome),
                // Whoever cancelled or owns the run decides what comes next.
                Err(WhitelistError::DiscoveryInProgress(_))
                | Err(WhitelistError::Cancelled(_))
                | Err(WhitelistError::UnknownRepository(_)) => {
                    debug!("Scheduled discovery of {} skipped: {:?}", repository_id, result);
                    return;
                }
                Err(e) => warn!("Scheduled discovery of {} failed: {}", repository_id, e),
            }

            reschedule(&coordinator, &due, &repository_id);
        })
    }

    /// Processes events and dispatches due runs until shut down.
    pub async fn run(&self, mut events: mpsc::Receiver<RepositoryEvent>) {
        let mut ticker = tokio::time::interval(self.coordinator.config().scheduler_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        info!(
            "Discovery scheduler started with {} workers",
            self.coordinator.config().workers
        );
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        debug!("Repository event: {:?}", event);
                        if let Err(e) = self.handle_event(event) {
                            warn!("Failed to handle repository event: {}", e);
                        }
                    }
                    None => {
                        debug!("Repository event channel closed");
                        events_open = false;
                    }
                },
                _ = ticker.tick() => {
                    self.dispatch_due();
                }
            }
        }
        info!("Discovery scheduler stopped");
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

fn reschedule(
    coordinator: &DiscoveryCoordinator,
    due: &Mutex<HashMap<String, Instant>>,
    repository_id: &str,
) {
    let record = match coordinator.store().get(repository_id) {
        Some(record) if coordinator.is_registered(repository_id) => record,
        _ => {
            due.lock().remove(repository_id);
            return;
        }
    };

    match next_delay(coordinator.config(), &record) {
        Some(delay) => {
            debug!("Next discovery of {} in {:?}", repository_id, delay);
            due.lock()
                .insert(repository_id.to_string(), Instant::now() + delay);
        }
        None => {
            due.lock().remove(repository_id);
        }
    }
}
