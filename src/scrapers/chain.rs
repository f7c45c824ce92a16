use log::{debug, info};
use std::sync::Arc;

use super::registry::default_scrapers;
use super::{CrawlFailure, DetectionResult, ScrapeContext, Scraper};
use crate::storage::PrefixEntry;

#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    Scraped {
        scraper: String,
        prefixes: Vec<PrefixEntry>,
    },
    OptedOut {
        scraper: String,
    },
    Exhausted,
    RootUnreachable(String),
    CrawlFailed {
        scraper: String,
        failure: CrawlFailure,
    },
    Cancelled,
}

/// Scrapers ordered by ascending priority. The first one that recognizes the
/// remote decides the outcome.
#[derive(Clone)]
pub struct ScraperChain {
    scrapers: Vec<Arc<dyn Scraper>>,
}

impl Default for ScraperChain {
    fn default() -> Self {
        Self::new(default_scrapers())
    }
}

impl ScraperChain {
    pub fn new(scrapers: Vec<Arc<dyn Scraper>>) -> Self {
        let mut chain = Self {
            scrapers: Vec::with_capacity(scrapers.len()),
        };
        for scraper in scrapers {
            chain = chain.register(scraper);
        }
        chain
    }

    pub fn register(mut self, scraper: Arc<dyn Scraper>) -> Self {
        self.scrapers.push(scraper);
        // Ties are broken by id so the order never depends on registration.
        self.scrapers.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.id().cmp(b.id()))
        });
        self
    }

    pub fn scrapers(&self) -> &[Arc<dyn Scraper>] {
        &self.scrapers
    }

    pub async fn scrape(&self, context: &mut ScrapeContext<'_>) -> ChainOutcome {
        let root = match context.root_response().await {
            Ok(root) => root,
            Err(_) if context.is_cancelled() => return ChainOutcome::Cancelled,
            Err(e) => {
                context.remark(format!("remote root unreachable: {}", e));
                return ChainOutcome::RootUnreachable(e);
            }
        };

        for scraper in &self.scrapers {
            if context.is_cancelled() {
                return ChainOutcome::Cancelled;
            }

            let profile = scraper.profile();
            match scraper.detect(context).await {
                DetectionResult::RecognizedShouldBeScraped => {
                    info!("{} claimed {}", profile, context.base_url());
                    return match scraper.crawl(context).await {
                        Ok(prefixes) => {
                            context.remark(format!(
                                "{} discovered {} prefixes",
                                profile.id,
                                prefixes.len()
                            ));
                            ChainOutcome::Scraped {
                                scraper: profile.id.clone(),
                                prefixes,
                            }
                        }
                        Err(CrawlFailure::Cancelled) => ChainOutcome::Cancelled,
                        Err(failure) => {
                            context.remark(format!("{} crawl failed: {}", profile.id, failure));
                            ChainOutcome::CrawlFailed {
                                scraper: profile.id.clone(),
                                failure,
                            }
                        }
                    };
                }
                DetectionResult::RecognizedShouldNotBeScraped => {
                    info!("{} opted out {}", profile, context.base_url());
                    return ChainOutcome::OptedOut {
                        scraper: profile.id.clone(),
                    };
                }
                DetectionResult::Unrecognized => {
                    debug!("{} did not recognize {}", profile.id, context.base_url());
                }
            }
        }

        if !root.is_success() {
            let reason = format!("remote root answered HTTP {}", root.status);
            context.remark(reason.clone());
            return ChainOutcome::RootUnreachable(reason);
        }

        context.remark("no scraper recognized the remote");
        ChainOutcome::Exhausted
    }
}
