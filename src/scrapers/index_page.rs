use async_trait::async_trait;
use log::debug;

use super::crawl::crawl_index;
use super::detection::{refine, Probe, Refinement};
use super::{CrawlFailure, DetectionResult, RemoteServerProfile, ScrapeContext, Scraper};
use crate::parser::ListingPage;
use crate::storage::PrefixEntry;

/// Scraper for servers that generate directory index pages.
///
/// The root counts as generated only when it carries one of the expected
/// "parent directory" anchors. Anything else is a custom landing page, no
/// matter what the refinements say.
#[derive(Debug, Clone)]
pub struct GeneratedIndexPageScraper {
    profile: RemoteServerProfile,
    parent_markers: Vec<String>,
    refinements: Vec<Refinement>,
}

impl GeneratedIndexPageScraper {
    pub fn new(profile: RemoteServerProfile) -> Self {
        Self {
            profile,
            parent_markers: Vec::new(),
            refinements: Vec::new(),
        }
    }

    pub fn with_parent_marker(mut self, anchor_text: &str) -> Self {
        self.parent_markers.push(anchor_text.to_string());
        self
    }

    pub fn with_refinement(mut self, refinement: Refinement) -> Self {
        self.refinements.push(refinement);
        self
    }

    pub fn targeted_server(&self) -> &str {
        &self.profile.display_name
    }

    fn looks_generated(&self, page: &ListingPage) -> bool {
        self.parent_markers
            .iter()
            .any(|marker| page.has_parent_anchor(marker))
    }
}

#[async_trait]
impl Scraper for GeneratedIndexPageScraper {
    fn profile(&self) -> &RemoteServerProfile {
        &self.profile
    }

    async fn detect(&self, context: &mut ScrapeContext<'_>) -> DetectionResult {
        let root = match context.root_response().await {
            Ok(root) => root,
            Err(e) => {
                context.remark(format!("{}: root not readable: {}", self.profile.id, e));
                return DetectionResult::Unrecognized;
            }
        };
        if !root.is_success() {
            context.remark(format!(
                "{}: root answered HTTP {}",
                self.profile.id, root.status
            ));
            return DetectionResult::Unrecognized;
        }

        let probe = Probe::new(&root);
        let page = ListingPage::parse(&root.url, probe.body);
        if !self.looks_generated(&page) {
            context.remark(format!(
                "{}: no parent directory anchor, not a {}",
                self.profile.id,
                self.targeted_server()
            ));
            return DetectionResult::Unrecognized;
        }

        let (result, failed) = refine(
            DetectionResult::RecognizedShouldBeScraped,
            &self.refinements,
            &probe,
        );
        if let Some(failed) = failed {
            context.remark(format!("{}: check failed: {}", self.profile.id, failed));
        } else {
            context.remark(format!("{}: recognized {}", self.profile.id, self.targeted_server()));
        }
        debug!("{} detection on {}: {:?}", self.profile.id, context.base_url(), result);
        result
    }

    async fn crawl(&self, context: &mut ScrapeContext<'_>) -> Result<Vec<PrefixEntry>, CrawlFailure> {
        crawl_index(context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{MockResponse, MockTransport};
    use crate::scrapers::registry::{apache_index, nginx_index};
    use url::Url;

    const ROOT: &str = "http://repo.example.com/";
    const NGINX_BODY: &str = r#"<html><body><h1>Index of /</h1><hr><pre><a href="../">../</a>
<a href="lib/">lib/</a>
<a href="org/">org/</a>
</pre><hr></body></html>"#;

    async fn detect_with(scraper: &GeneratedIndexPageScraper, response: MockResponse) -> DetectionResult {
        let transport = MockTransport::new().with_route(ROOT, response);
        let mut context = ScrapeContext::new(Url::parse(ROOT).unwrap(), &transport);
        scraper.detect(&mut context).await
    }

    #[tokio::test]
    async fn test_nginx_index_is_recognized() {
        let result = detect_with(
            &nginx_index(),
            MockResponse::ok(NGINX_BODY).with_header("Server", "nginx/1.18.0"),
        )
        .await;
        assert_eq!(result, DetectionResult::RecognizedShouldBeScraped);
    }

    #[tokio::test]
    async fn test_nginx_body_from_apache_is_unrecognized() {
        let result = detect_with(
            &nginx_index(),
            MockResponse::ok(NGINX_BODY).with_header("Server", "Apache/2.4"),
        )
        .await;
        assert_eq!(result, DetectionResult::Unrecognized);
    }

    #[tokio::test]
    async fn test_custom_landing_page_is_unrecognized() {
        let result = detect_with(
            &nginx_index(),
            MockResponse::ok("<html><body><h1>Welcome to our repository</h1><a href=\"docs/\">Docs</a></body></html>")
                .with_header("Server", "nginx/1.18.0"),
        )
        .await;
        assert_eq!(result, DetectionResult::Unrecognized);
    }

    #[tokio::test]
    async fn test_error_status_is_unrecognized() {
        let result = detect_with(
            &nginx_index(),
            MockResponse::status(403)
                .with_body(NGINX_BODY)
                .with_header("Server", "nginx/1.18.0"),
        )
        .await;
        assert_eq!(result, DetectionResult::Unrecognized);
    }

    #[tokio::test]
    async fn test_transport_failure_is_unrecognized() {
        let result = detect_with(&nginx_index(), MockResponse::failure("connection refused")).await;
        assert_eq!(result, DetectionResult::Unrecognized);
    }

    #[tokio::test]
    async fn test_apache_index_is_recognized() {
        let body = r#"<html><body><h1>Index of /</h1><ul>
<li><a href="/"> Parent Directory</a></li>
<li><a href="com/"> com/</a></li>
</ul></body></html>"#;
        let result = detect_with(
            &apache_index(),
            MockResponse::ok(body).with_header("Server", "Apache/2.4.41 (Ubuntu)"),
        )
        .await;
        assert_eq!(result, DetectionResult::RecognizedShouldBeScraped);
    }
}
