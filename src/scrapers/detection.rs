use regex::Regex;
use std::fmt;

use crate::http::HttpResponse;

/// Upper bound of body bytes inspected during detection.
pub const DETECTION_BODY_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionResult {
    RecognizedShouldBeScraped,
    RecognizedShouldNotBeScraped,
    Unrecognized,
}

impl DetectionResult {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, DetectionResult::Unrecognized)
    }
}

/// What detection is allowed to look at: status, headers and a bounded body.
#[derive(Debug, Clone, Copy)]
pub struct Probe<'r> {
    pub response: &'r HttpResponse,
    pub body: &'r str,
}

impl<'r> Probe<'r> {
    pub fn new(response: &'r HttpResponse) -> Self {
        Self {
            response,
            body: bounded_prefix(&response.body, DETECTION_BODY_LIMIT),
        }
    }
}

fn bounded_prefix(body: &str, limit: usize) -> &str {
    if body.len() <= limit {
        return body;
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// A secondary check that can only narrow a positive detection.
#[derive(Debug, Clone)]
pub enum Refinement {
    ServerHeaderStartsWith(String),
    ServerHeaderContains(String),
    BodyMatches(Regex),
    StatusIs(u16),
}

impl Refinement {
    pub fn server_starts_with(prefix: &str) -> Self {
        Refinement::ServerHeaderStartsWith(prefix.to_string())
    }

    pub fn server_contains(fragment: &str) -> Self {
        Refinement::ServerHeaderContains(fragment.to_string())
    }

    pub fn holds(&self, probe: &Probe<'_>) -> bool {
        match self {
            Refinement::ServerHeaderStartsWith(prefix) => probe
                .response
                .server()
                .map(|server| server.starts_with(prefix.as_str()))
                .unwrap_or(false),
            Refinement::ServerHeaderContains(fragment) => probe
                .response
                .server()
                .map(|server| server.contains(fragment.as_str()))
                .unwrap_or(false),
            Refinement::BodyMatches(pattern) => pattern.is_match(probe.body),
            Refinement::StatusIs(status) => probe.response.status == *status,
        }
    }
}

impl fmt::Display for Refinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refinement::ServerHeaderStartsWith(prefix) => {
                write!(f, "Server header starts with {:?}", prefix)
            }
            Refinement::ServerHeaderContains(fragment) => {
                write!(f, "Server header contains {:?}", fragment)
            }
            Refinement::BodyMatches(pattern) => write!(f, "body matches /{}/", pattern),
            Refinement::StatusIs(status) => write!(f, "status is {}", status),
        }
    }
}

/// Applies `refinements` in order to an optimistic `initial` result. The first
/// failing one downgrades the result to `Unrecognized` and is returned with it.
pub fn refine<'a>(
    initial: DetectionResult,
    refinements: &'a [Refinement],
    probe: &Probe<'_>,
) -> (DetectionResult, Option<&'a Refinement>) {
    if initial == DetectionResult::Unrecognized {
        return (initial, None);
    }
    match refinements.iter().find(|refinement| !refinement.holds(probe)) {
        Some(failed) => (DetectionResult::Unrecognized, Some(failed)),
        None => (initial, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use url::Url;

    fn response(server: Option<&str>, body: &str) -> HttpResponse {
        let mut headers = HashMap::new();
        if let Some(server) = server {
            headers.insert("server".to_string(), server.to_string());
        }
        HttpResponse {
            url: Url::parse("http://repo.example.com/").unwrap(),
            status: 200,
            headers,
            body: body.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_refinements_are_conjunctive() {
        let response = response(Some("nginx/1.18.0"), "<title>Index of /</title>");
        let probe = Probe::new(&response);
        let refinements = vec![
            Refinement::server_starts_with("nginx/"),
            Refinement::BodyMatches(Regex::new("Index of").unwrap()),
            Refinement::StatusIs(200),
        ];

        let (result, failed) = refine(DetectionResult::RecognizedShouldBeScraped, &refinements, &probe);
        assert_eq!(result, DetectionResult::RecognizedShouldBeScraped);
        assert!(failed.is_none());

        let mut stricter = refinements.clone();
        stricter.push(Refinement::server_contains("Ubuntu"));
        let (result, failed) = refine(DetectionResult::RecognizedShouldBeScraped, &stricter, &probe);
        assert_eq!(result, DetectionResult::Unrecognized);
        assert_eq!(
            failed.map(|r| r.to_string()),
            Some("Server header contains \"Ubuntu\"".to_string())
        );
    }

    #[test]
    fn test_missing_server_header_fails_header_checks() {
        let response = response(None, "");
        let probe = Probe::new(&response);
        assert!(!Refinement::server_starts_with("nginx/").holds(&probe));
        assert!(!Refinement::server_contains("nginx").holds(&probe));
    }

    #[test]
    fn test_refinement_never_upgrades() {
        let response = response(Some("nginx/1.18.0"), "");
        let probe = Probe::new(&response);
        let (result, _) = refine(
            DetectionResult::Unrecognized,
            &[Refinement::server_starts_with("nginx/")],
            &probe,
        );
        assert_eq!(result, DetectionResult::Unrecognized);
    }

    #[test]
    fn test_opt_out_is_narrowed_too() {
        let response = response(Some("Apache/2.4"), "");
        let probe = Probe::new(&response);
        let (result, _) = refine(
            DetectionResult::RecognizedShouldNotBeScraped,
            &[Refinement::server_starts_with("Nexus/")],
            &probe,
        );
        assert_eq!(result, DetectionResult::Unrecognized);
    }

    #[test]
    fn test_body_is_bounded_on_char_boundary() {
        let body = "é".repeat(DETECTION_BODY_LIMIT);
        let response = response(None, &body);
        let probe = Probe::new(&response);
        assert!(probe.body.len() <= DETECTION_BODY_LIMIT);
        assert!(probe.body.len() >= DETECTION_BODY_LIMIT - 1);
    }
}
