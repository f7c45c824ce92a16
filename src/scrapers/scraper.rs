use async_trait::async_trait;
use thiserror::Error;

use super::{DetectionResult, RemoteServerProfile, ScrapeContext};
use crate::storage::PrefixEntry;

/// Failure of a crawl that followed a positive detection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlFailure {
    #[error("root listing fetch failed: {0}")]
    RootFetch(String),
    #[error("root listing answered HTTP {0}")]
    RootStatus(u16),
    #[error("crawl cancelled")]
    Cancelled,
    #[error("remote must not be scraped: {0}")]
    NotScrapable(String),
}

#[async_trait]
pub trait Scraper: Send + Sync {
    fn profile(&self) -> &RemoteServerProfile;

    /// Decides whether this strategy claims the remote. Never fails: anything
    /// that prevents a decision yields `Unrecognized`.
    async fn detect(&self, context: &mut ScrapeContext<'_>) -> DetectionResult;

    /// Only called after `detect` returned `RecognizedShouldBeScraped`.
    async fn crawl(&self, context: &mut ScrapeContext<'_>) -> Result<Vec<PrefixEntry>, CrawlFailure>;

    fn id(&self) -> &str {
        &self.profile().id
    }

    fn priority(&self) -> u32 {
        self.profile().priority
    }
}
