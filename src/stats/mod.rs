use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::storage::DiscoveryOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryStats {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub cancelled_runs: usize,
    pub requests_issued: usize,
    pub bytes_downloaded: usize,
    pub outcomes: HashMap<DiscoveryOutcome, usize>,
    pub scrapers: HashMap<String, usize>,
    pub average_run_time: f64, // in milliseconds
}

#[derive(Debug, Clone)]
pub struct StatsTracker {
    stats: Arc<RwLock<DiscoveryStats>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(RwLock::new(DiscoveryStats {
                start_time: Utc::now(),
                end_time: None,
                total_runs: 0,
                successful_runs: 0,
                failed_runs: 0,
                cancelled_runs: 0,
                requests_issued: 0,
                bytes_downloaded: 0,
                outcomes: HashMap::new(),
                scrapers: HashMap::new(),
                average_run_time: 0.0,
            })),
        }
    }

    pub fn record_run(
        &self,
        outcome: DiscoveryOutcome,
        scraper: Option<&str>,
        requests: usize,
        bytes: usize,
        duration: Duration,
    ) {
        let mut stats = self.stats.write();
        stats.total_runs += 1;

        if outcome.is_failure() {
            stats.failed_runs += 1;
        } else {
            stats.successful_runs += 1;
        }

        *stats.outcomes.entry(outcome).or_insert(0) += 1;
        if let Some(scraper) = scraper {
            *stats.scrapers.entry(scraper.to_string()).or_insert(0) += 1;
        }
        stats.requests_issued += requests;
        stats.bytes_downloaded += bytes;

        let current_total = stats.average_run_time * (stats.total_runs - 1) as f64;
        let new_duration = duration.num_milliseconds() as f64;
        stats.average_run_time = (current_total + new_duration) / stats.total_runs as f64;
    }

    /// Cancelled runs leave no outcome behind and stay out of the averages.
    pub fn record_cancelled(&self) {
        self.stats.write().cancelled_runs += 1;
    }

    pub fn finish(&self) {
        self.stats.write().end_time = Some(Utc::now());
    }

    pub fn get_stats(&self) -> DiscoveryStats {
        self.stats.read().clone()
    }

    pub fn print_summary(&self) {
        let stats = self.stats.read();
        let duration = stats
            .end_time
            .unwrap_or_else(Utc::now)
            .signed_duration_since(stats.start_time);

        println!("\nDiscovery Statistics:");
        println!("=====================");
        println!("Duration: {} seconds", duration.num_seconds());
        println!("Total Runs: {}", stats.total_runs);
        println!("Completed Runs: {}", stats.successful_runs);
        println!("Failed Runs: {}", stats.failed_runs);
        println!("Cancelled Runs: {}", stats.cancelled_runs);
        println!("Requests Issued: {}", stats.requests_issued);
        println!(
            "Data Downloaded: {:.2} MB",
            stats.bytes_downloaded as f64 / 1_000_000.0
        );
        println!("Average Run Time: {:.2}ms", stats.average_run_time);

        println!("\nOutcomes:");
        for (outcome, count) in &stats.outcomes {
            println!("  {:?}: {}", outcome, count);
        }

        if !stats.scrapers.is_empty() {
            println!("\nClaimed By:");
            for (scraper, count) in &stats.scrapers {
                println!("  {}: {}", scraper, count);
            }
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}
