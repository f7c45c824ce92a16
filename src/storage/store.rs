use dashmap::DashMap;
use log::{info, warn};
use std::sync::Arc;

use super::disk::DiskStorage;
use super::record::{DiscoveryStatus, WhitelistRecord};
use crate::WhitelistResult;

/// Per-repository whitelist records.
///
/// Records are immutable once stored: `put` swaps in a new `Arc`, so a reader
/// holding a snapshot never observes a write in progress. The map is sharded,
/// so writes to one repository do not block reads of another.
#[derive(Default)]
pub struct WhitelistStore {
    records: DashMap<String, Arc<WhitelistRecord>>,
    disk: Option<DiskStorage>,
}

impl WhitelistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by `disk`, pre-populated with whatever it holds.
    pub fn with_persistence(disk: DiskStorage) -> WhitelistResult<Self> {
        let records = DashMap::new();
        for record in disk.load_all()? {
            records.insert(record.repository_id.clone(), Arc::new(record));
        }
        info!(
            "Loaded {} whitelist records from {}",
            records.len(),
            disk.base_path().display()
        );

        Ok(Self {
            records,
            disk: Some(disk),
        })
    }

    pub fn get(&self, repository_id: &str) -> Option<Arc<WhitelistRecord>> {
        self.records
            .get(repository_id)
            .map(|record| Arc::clone(record.value()))
    }

    pub fn put(&self, record: WhitelistRecord) {
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.save(&record) {
                warn!(
                    "Failed to persist whitelist record for {}: {}",
                    record.repository_id, e
                );
            }
        }
        self.records
            .insert(record.repository_id.clone(), Arc::new(record));
    }

    pub fn remove(&self, repository_id: &str) -> Option<Arc<WhitelistRecord>> {
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.delete(repository_id) {
                warn!(
                    "Failed to delete persisted whitelist record for {}: {}",
                    repository_id, e
                );
            }
        }
        self.records.remove(repository_id).map(|(_, record)| record)
    }

    pub fn contains(&self, repository_id: &str) -> bool {
        self.records.contains_key(repository_id)
    }

    pub fn status(&self, repository_id: &str) -> Option<DiscoveryStatus> {
        self.get(repository_id).map(|record| record.status_view())
    }

    pub fn statuses(&self) -> Vec<DiscoveryStatus> {
        let mut statuses: Vec<_> = self
            .records
            .iter()
            .map(|entry| entry.value().status_view())
            .collect();
        statuses.sort_by(|a, b| a.repository_id.cmp(&b.repository_id));
        statuses
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
