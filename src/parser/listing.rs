use log::trace;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

fn anchor_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("a[href]").expect("anchor selector is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub href: String,
    pub text: String,
}

/// A link pointing one level below the listing it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildLink {
    pub name: String,
    pub url: Url,
    pub is_directory: bool,
}

/// Anchors of a directory listing page, detached from the parsed DOM so the
/// result can be held across await points.
#[derive(Debug, Clone)]
pub struct ListingPage {
    url: Url,
    anchors: Vec<Anchor>,
}

impl ListingPage {
    pub fn parse(url: &Url, body: &str) -> Self {
        let document = Html::parse_document(body);
        let anchors: Vec<Anchor> = document
            .select(anchor_selector())
            .filter_map(|element| {
                element.value().attr("href").map(|href| Anchor {
                    href: href.trim().to_string(),
                    text: element.text().collect::<String>().trim().to_string(),
                })
            })
            .collect();

        trace!("Parsed {} anchors from {}", anchors.len(), url);

        Self {
            url: url.clone(),
            anchors,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn parent_url(&self) -> Url {
        self.url.join("../").unwrap_or_else(|_| self.url.clone())
    }

    /// Whether the page carries a generated "parent directory" anchor: its
    /// text equals `marker_text` and its href resolves to the parent URL.
    pub fn has_parent_anchor(&self, marker_text: &str) -> bool {
        let parent = self.parent_url();
        self.anchors.iter().any(|anchor| {
            anchor.text.eq_ignore_ascii_case(marker_text)
                && self
                    .url
                    .join(&anchor.href)
                    .map(|resolved| resolved == parent)
                    .unwrap_or(false)
        })
    }

    pub fn child_links(&self) -> Vec<ChildLink> {
        let mut seen = HashSet::new();
        self.anchors
            .iter()
            .filter_map(|anchor| self.child_link(&anchor.href))
            .filter(|link| seen.insert(link.name.clone()))
            .collect()
    }

    fn child_link(&self, href: &str) -> Option<ChildLink> {
        if href.is_empty() || href.starts_with('/') || href.contains(['?', '#']) {
            return None;
        }
        // Absolute URLs, including mailto: and friends.
        if Url::parse(href).is_ok() {
            return None;
        }
        if href == "." || href == ".." || href.starts_with("./") || href.starts_with("../") {
            return None;
        }

        let resolved = self.url.join(href).ok()?;
        if resolved.origin() != self.url.origin() {
            return None;
        }

        let remainder = resolved.path().strip_prefix(self.url.path())?;
        let (name, is_directory) = match remainder.strip_suffix('/') {
            Some(name) => (name, true),
            None => (remainder, false),
        };
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return None;
        }

        Some(ChildLink {
            name: name.to_string(),
            url: resolved,
            is_directory,
        })
    }
}
