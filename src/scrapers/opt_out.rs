use async_trait::async_trait;

use super::detection::{refine, Probe, Refinement};
use super::{CrawlFailure, DetectionResult, RemoteServerProfile, ScrapeContext, Scraper};
use crate::storage::PrefixEntry;

/// Recognizes remotes that must never be scraped, such as repository managers
/// that publish their own prefix lists or object stores without listings.
///
/// Detection starts at `RecognizedShouldNotBeScraped` and is narrowed by the
/// refinements; the HTTP status is not required to be a success.
#[derive(Debug, Clone)]
pub struct OptOutScraper {
    profile: RemoteServerProfile,
    refinements: Vec<Refinement>,
}

impl OptOutScraper {
    pub fn new(profile: RemoteServerProfile) -> Self {
        Self {
            profile,
            refinements: Vec::new(),
        }
    }

    pub fn with_refinement(mut self, refinement: Refinement) -> Self {
        self.refinements.push(refinement);
        self
    }
}

#[async_trait]
impl Scraper for OptOutScraper {
    fn profile(&self) -> &RemoteServerProfile {
        &self.profile
    }

    async fn detect(&self, context: &mut ScrapeContext<'_>) -> DetectionResult {
        let root = match context.root_response().await {
            Ok(root) => root,
            Err(_) => return DetectionResult::Unrecognized,
        };

        // Without any check this would claim every remote.
        if self.refinements.is_empty() {
            return DetectionResult::Unrecognized;
        }

        let probe = Probe::new(&root);
        let (result, _) = refine(
            DetectionResult::RecognizedShouldNotBeScraped,
            &self.refinements,
            &probe,
        );
        if result.is_recognized() {
            context.remark(format!(
                "{}: remote is a {}, which must not be scraped",
                self.profile.id, self.profile.display_name
            ));
        }
        result
    }

    async fn crawl(&self, _context: &mut ScrapeContext<'_>) -> Result<Vec<PrefixEntry>, CrawlFailure> {
        Err(CrawlFailure::NotScrapable(self.profile.display_name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{MockResponse, MockTransport};
    use crate::scrapers::registry::{amazon_s3, nexus};
    use url::Url;

    const ROOT: &str = "http://repo.example.com/";

    async fn detect_with(scraper: &OptOutScraper, response: MockResponse) -> DetectionResult {
        let transport = MockTransport::new().with_route(ROOT, response);
        let mut context = ScrapeContext::new(Url::parse(ROOT).unwrap(), &transport);
        scraper.detect(&mut context).await
    }

    #[tokio::test]
    async fn test_nexus_opts_out() {
        let response = MockResponse::ok("<html>Nexus Repository Manager</html>")
            .with_header("Server", "Nexus/3.38.1-01 (OSS)");
        assert_eq!(
            detect_with(&nexus(), response).await,
            DetectionResult::RecognizedShouldNotBeScraped
        );
    }

    #[tokio::test]
    async fn test_s3_opts_out_even_when_forbidden() {
        let response = MockResponse::status(403)
            .with_body("<Error><Code>AccessDenied</Code></Error>")
            .with_header("Server", "AmazonS3");
        assert_eq!(
            detect_with(&amazon_s3(), response).await,
            DetectionResult::RecognizedShouldNotBeScraped
        );
    }

    #[tokio::test]
    async fn test_other_servers_are_unrecognized() {
        let response = MockResponse::ok("").with_header("Server", "nginx/1.18.0");
        assert_eq!(detect_with(&nexus(), response.clone()).await, DetectionResult::Unrecognized);
        assert_eq!(detect_with(&amazon_s3(), response).await, DetectionResult::Unrecognized);
    }

    #[tokio::test]
    async fn test_crawl_is_refused() {
        let transport = MockTransport::new();
        let mut context = ScrapeContext::new(Url::parse(ROOT).unwrap(), &transport);
        assert!(matches!(
            nexus().crawl(&mut context).await,
            Err(CrawlFailure::NotScrapable(_))
        ));
        assert_eq!(transport.request_count(), 0);
    }
}
