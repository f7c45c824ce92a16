pub mod backoff;
pub mod config;
mod coordinator;
mod errors;
pub mod scheduler;


pub use backoff::{BackoffConfig, BackoffPolicy};
pub use config::{AppConfig, CrawlLimits, DiscoveryConfig, RepositoryConfig};
pub use coordinator::DiscoveryCoordinator;
pub use errors::{WhitelistError, WhitelistResult};
pub use scheduler::{next_delay, DiscoveryScheduler, RepositoryEvent};
