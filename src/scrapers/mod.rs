pub mod chain;
pub mod context;
pub mod crawl;
pub mod detection;
pub mod index_page;
pub mod opt_out;
pub mod profile;
pub mod registry;
mod scraper;


pub use chain::{ChainOutcome, ScraperChain};
pub use context::ScrapeContext;
pub use detection::{DetectionResult, Refinement};
pub use index_page::GeneratedIndexPageScraper;
pub use opt_out::OptOutScraper;
pub use profile::RemoteServerProfile;
pub use self::scraper::{CrawlFailure, Scraper};
