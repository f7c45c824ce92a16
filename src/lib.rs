pub mod core;
pub mod filter;
pub mod http;
pub mod parser;
pub mod scrapers;
pub mod stats;
pub mod storage;

pub use crate::core::{
    AppConfig, DiscoveryConfig, DiscoveryCoordinator, DiscoveryScheduler, RepositoryConfig,
    RepositoryEvent,
};
pub use crate::core::{WhitelistError, WhitelistResult};
pub use filter::RequestFilter;
pub use http::{HttpResponse, HttpTransport, ReqwestTransport};
pub use scrapers::{Scraper, ScraperChain};
pub use stats::StatsTracker;
pub use storage::{DiskStorage, WhitelistRecord, WhitelistStatus, WhitelistStore};
