use futures::stream::{self, StreamExt};
use log::debug;
use std::collections::HashSet;
use url::Url;

use super::context::fetch_cancellable;
use super::{CrawlFailure, ScrapeContext};
use crate::http::HttpResponse;
use crate::parser::ListingPage;
use crate::storage::PrefixEntry;
use crate::WhitelistResult;

struct PendingListing {
    path: String,
    url: Url,
    depth: usize,
}

/// Walks a generated directory listing breadth-first from the root.
///
/// Every first-level child (file or directory) becomes a depth-1 entry.
/// Directories above `max_depth` are listed and their sub-directories
/// recorded one level deeper. Failing sub-listings are skipped with a remark;
/// only a failing root or cancellation aborts the crawl.
pub async fn crawl_index(context: &mut ScrapeContext<'_>) -> Result<Vec<PrefixEntry>, CrawlFailure> {
    let root = match context.root_response().await {
        Ok(root) => root,
        Err(_) if context.is_cancelled() => return Err(CrawlFailure::Cancelled),
        Err(e) => return Err(CrawlFailure::RootFetch(e)),
    };
    if !root.is_success() {
        return Err(CrawlFailure::RootStatus(root.status));
    }

    let base = context.base_url().clone();
    if root.url.origin() != base.origin() {
        return Err(CrawlFailure::RootFetch(format!(
            "root redirected off origin to {}",
            root.url
        )));
    }

    let started_at = context.started_at();
    let limits = context.limits().clone();
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut frontier = Vec::new();

    // Relative hrefs resolve against where the root listing was served from.
    let root_page = ListingPage::parse(&root.url, &root.body);
    for child in root_page.child_links() {
        if seen.insert(child.name.clone()) {
            entries.push(PrefixEntry::new(&child.name, 1, started_at));
        }
        if child.is_directory && limits.max_depth > 1 {
            frontier.push(PendingListing {
                path: child.name,
                url: child.url,
                depth: 1,
            });
        }
    }
    context.remark(format!("root listing has {} first-level entries", entries.len()));

    while !frontier.is_empty() {
        if context.is_cancelled() {
            return Err(CrawlFailure::Cancelled);
        }

        let budget = context.remaining_requests();
        if budget == 0 {
            context.remark(format!(
                "request budget of {} exhausted, {} listings left uncrawled",
                limits.max_requests,
                frontier.len()
            ));
            break;
        }
        if frontier.len() > budget {
            context.remark(format!(
                "request budget of {} reached, {} listings left uncrawled",
                limits.max_requests,
                frontier.len() - budget
            ));
            frontier.truncate(budget);
        }

        let transport = context.transport();
        let cancel = context.cancellation().clone();
        let results: Vec<(PendingListing, WhitelistResult<HttpResponse>)> =
            stream::iter(std::mem::take(&mut frontier))
                .map(|listing| {
                    let cancel = &cancel;
                    async move {
                        let result = fetch_cancellable(transport, cancel, &listing.url).await;
                        (listing, result)
                    }
                })
                .buffer_unordered(limits.concurrency.max(1))
                .collect()
                .await;

        if context.is_cancelled() {
            return Err(CrawlFailure::Cancelled);
        }

        for (listing, result) in results {
            context.record_request(result.as_ref().ok());
            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    context.remark(format!("skipped {}/: {}", listing.path, e));
                    continue;
                }
            };
            if !response.is_success() {
                context.remark(format!("skipped {}/: HTTP {}", listing.path, response.status));
                continue;
            }
            if response.url.origin() != base.origin() {
                context.remark(format!(
                    "skipped {}/: redirected off origin to {}",
                    listing.path, response.url
                ));
                continue;
            }

            let page = ListingPage::parse(&response.url, &response.body);
            for child in page.child_links().into_iter().filter(|c| c.is_directory) {
                let path = format!("{}/{}", listing.path, child.name);
                let depth = listing.depth + 1;
                if !seen.insert(path.clone()) {
                    continue;
                }
                entries.push(PrefixEntry::new(&path, depth, started_at));
                if depth < limits.max_depth {
                    frontier.push(PendingListing {
                        path,
                        url: child.url,
                        depth,
                    });
                }
            }
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(
        "Crawled {}: {} entries with {} requests",
        base,
        entries.len(),
        context.requests_issued()
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CrawlLimits;
    use crate::http::{MockResponse, MockTransport};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const BASE: &str = "http://repo.example.com/maven2/";

    fn listing(children: &[&str]) -> MockResponse {
        let mut body = String::from("<html><body><pre><a href=\"../\">../</a>\n");
        for child in children {
            body.push_str(&format!("<a href=\"{0}\">{0}</a>\n", child));
        }
        body.push_str("</pre></body></html>");
        MockResponse::ok(&body).with_header("Server", "nginx/1.18.0")
    }

    fn transport() -> MockTransport {
        MockTransport::new()
            .with_route(BASE, listing(&["lib/", "org/", "maven-metadata.xml"]))
            .with_route(&format!("{}lib/", BASE), listing(&["commons/"]))
            .with_route(&format!("{}org/", BASE), listing(&["apache/", "junit/", "README"]))
            .with_route(&format!("{}org/apache/", BASE), listing(&["maven/"]))
    }

    fn paths(entries: &[PrefixEntry]) -> Vec<(String, usize)> {
        entries.iter().map(|e| (e.path.clone(), e.depth)).collect()
    }

    fn context(transport: &MockTransport, limits: CrawlLimits) -> ScrapeContext<'_> {
        ScrapeContext::new(Url::parse(BASE).unwrap(), transport).with_limits(limits)
    }

    #[tokio::test]
    async fn test_crawl_first_level_only() {
        let transport = transport();
        let mut context = context(
            &transport,
            CrawlLimits {
                max_depth: 1,
                ..Default::default()
            },
        );

        let entries = crawl_index(&mut context).await.unwrap();

        assert_eq!(
            paths(&entries),
            vec![
                ("lib".to_string(), 1),
                ("maven-metadata.xml".to_string(), 1),
                ("org".to_string(), 1),
            ]
        );
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_crawl_descends_directories() {
        let transport = transport();
        let mut context = context(
            &transport,
            CrawlLimits {
                max_depth: 3,
                ..Default::default()
            },
        );

        let entries = crawl_index(&mut context).await.unwrap();

        assert_eq!(
            paths(&entries),
            vec![
                ("lib".to_string(), 1),
                ("lib/commons".to_string(), 2),
                ("maven-metadata.xml".to_string(), 1),
                ("org".to_string(), 1),
                ("org/apache".to_string(), 2),
                ("org/apache/maven".to_string(), 3),
                ("org/junit".to_string(), 2),
            ]
        );
        // root, lib/, org/, lib/commons/, org/apache/, org/junit/
        assert_eq!(context.requests_issued(), 6);
    }

    #[tokio::test]
    async fn test_failing_sub_listing_is_skipped() {
        let transport = transport();
        transport.set_route(&format!("{}lib/", BASE), MockResponse::failure("connection reset"));
        let mut context = context(&transport, CrawlLimits::default());

        let entries = crawl_index(&mut context).await.unwrap();

        let found: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert!(found.contains(&"lib"));
        assert!(found.contains(&"org/apache"));
        assert!(!found.iter().any(|p| p.starts_with("lib/")));
        assert!(context
            .remarks()
            .iter()
            .any(|r| r.starts_with("skipped lib/") && r.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_off_origin_sub_listing_is_skipped() {
        let transport = transport();
        transport.set_route(
            &format!("{}org/", BASE),
            listing(&["evil/"]).with_final_url(Url::parse("http://mirror.example.net/org/").unwrap()),
        );
        let mut context = context(&transport, CrawlLimits::default());

        let entries = crawl_index(&mut context).await.unwrap();

        assert!(!entries.iter().any(|e| e.path == "org/evil"));
        assert!(context.remarks().iter().any(|r| r.contains("off origin")));
    }

    #[tokio::test]
    async fn test_redirected_root_resolves_children_against_final_url() {
        let served_from = format!("{}current/", BASE);
        let transport = MockTransport::new()
            .with_route(
                BASE,
                listing(&["lib/"]).with_final_url(Url::parse(&served_from).unwrap()),
            )
            .with_route(&format!("{}lib/", served_from), listing(&["commons/"]));
        let mut context = context(
            &transport,
            CrawlLimits {
                max_depth: 2,
                ..Default::default()
            },
        );

        let entries = crawl_index(&mut context).await.unwrap();

        assert_eq!(
            paths(&entries),
            vec![("lib".to_string(), 1), ("lib/commons".to_string(), 2)]
        );
        assert_eq!(
            transport.requests()[1].as_str(),
            "http://repo.example.com/maven2/current/lib/"
        );
    }

    #[tokio::test]
    async fn test_request_budget_bounds_crawl() {
        let transport = transport();
        let mut context = context(
            &transport,
            CrawlLimits {
                max_depth: 3,
                max_requests: 2,
                concurrency: 1,
            },
        );

        let entries = crawl_index(&mut context).await.unwrap();

        assert_eq!(transport.request_count(), 2);
        assert!(entries.iter().any(|e| e.path == "org"));
        assert!(context.remarks().iter().any(|r| r.contains("budget")));
    }

    #[tokio::test]
    async fn test_root_failures_abort() {
        let transport = MockTransport::new().with_route(BASE, MockResponse::failure("timed out"));
        let mut ctx = context(&transport, CrawlLimits::default());
        assert!(matches!(
            crawl_index(&mut ctx).await,
            Err(CrawlFailure::RootFetch(_))
        ));

        let transport = MockTransport::new().with_route(BASE, MockResponse::status(401));
        let mut ctx = context(&transport, CrawlLimits::default());
        assert_eq!(crawl_index(&mut ctx).await, Err(CrawlFailure::RootStatus(401)));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_crawl() {
        let transport = transport();
        transport.set_route(
            &format!("{}org/", BASE),
            listing(&["apache/"]).with_delay(Duration::from_secs(30)),
        );
        let cancel = CancellationToken::new();
        let mut context = context(&transport, CrawlLimits::default()).with_cancellation(cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), crawl_index(&mut context))
            .await
            .expect("crawl should stop promptly");
        assert_eq!(result, Err(CrawlFailure::Cancelled));
        canceller.await.unwrap();
    }
}
