use std::sync::Arc;

use crate::storage::WhitelistStore;

/// Answers, without any I/O, whether a request path could exist on a proxy
/// repository's remote.
///
/// Anything the whitelist cannot vouch for is allowed through: unknown
/// repositories, records that are not `Enabled` and requests for the root.
#[derive(Clone)]
pub struct RequestFilter {
    store: Arc<WhitelistStore>,
}

impl RequestFilter {
    pub fn new(store: Arc<WhitelistStore>) -> Self {
        Self { store }
    }

    pub fn may_exist(&self, repository_id: &str, request_path: &str) -> bool {
        let record = match self.store.get(repository_id) {
            Some(record) if record.is_enabled() => record,
            _ => return true,
        };

        let first_segment = request_path
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default();
        if first_segment.is_empty() {
            return true;
        }

        record.contains_prefix(first_segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DiscoveryOutcome, PrefixEntry, WhitelistRecord};
    use chrono::Utc;
    use url::Url;

    fn record() -> WhitelistRecord {
        WhitelistRecord::new("central", Url::parse("http://repo.example.com/").unwrap())
    }

    fn enabled_store(paths: &[&str]) -> Arc<WhitelistStore> {
        let now = Utc::now();
        let prefixes = paths.iter().map(|p| PrefixEntry::new(p, 1, now)).collect();
        let store = Arc::new(WhitelistStore::new());
        store.put(record().enabled("nginx-index", prefixes, now, Vec::new()));
        store
    }

    #[test]
    fn test_enabled_record_matches_first_segment_exactly() {
        let filter = RequestFilter::new(enabled_store(&["lib", "org"]));

        assert!(filter.may_exist("central", "/org/apache/maven/maven-core/3.9.0/maven-core-3.9.0.pom"));
        assert!(filter.may_exist("central", "lib/x.jar"));
        assert!(!filter.may_exist("central", "/com/google/guava/guava/maven-metadata.xml"));
        assert!(!filter.may_exist("central", "/organization/x"));
        assert!(!filter.may_exist("central", "/Org/x"));
    }

    #[test]
    fn test_root_request_is_allowed() {
        let filter = RequestFilter::new(enabled_store(&["org"]));
        assert!(filter.may_exist("central", "/"));
        assert!(filter.may_exist("central", ""));
        assert!(filter.may_exist("central", "//org"));
    }

    #[test]
    fn test_unknown_and_non_enabled_repositories_fail_open() {
        let store = Arc::new(WhitelistStore::new());
        let filter = RequestFilter::new(Arc::clone(&store));
        assert!(filter.may_exist("missing", "/com/x"));

        store.put(record());
        assert!(filter.may_exist("central", "/com/x"));

        let now = Utc::now();
        let enabled = record().enabled("nginx-index", vec![PrefixEntry::new("org", 1, now)], now, Vec::new());
        let unsupported = enabled.failed(DiscoveryOutcome::RootUnreachable, "timed out", now, Vec::new());
        assert_eq!(unsupported.prefixes.len(), 1);
        store.put(unsupported);
        assert!(filter.may_exist("central", "/com/x"));

        store.put(enabled.disabled(DiscoveryOutcome::OptedOut, Some("nexus"), now, Vec::new()));
        assert!(filter.may_exist("central", "/com/x"));
    }

    #[test]
    fn test_deeper_entries_do_not_widen_the_filter() {
        let now = Utc::now();
        let store = Arc::new(WhitelistStore::new());
        store.put(record().enabled(
            "nginx-index",
            vec![PrefixEntry::new("org", 1, now), PrefixEntry::new("org/apache", 2, now)],
            now,
            Vec::new(),
        ));
        let filter = RequestFilter::new(store);
        assert!(filter.may_exist("central", "/org/junit/junit.pom"));
        assert!(!filter.may_exist("central", "/com/x"));
    }
}
