use chrono::prelude::*;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Final URL after any same-origin redirects.
    pub url: Url,
    pub status: u16,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn server(&self) -> Option<&str> {
        self.header("server")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = HttpResponse {
            url: Url::parse("http://example.com/").unwrap(),
            status: 204,
            headers: HashMap::from([("server".to_string(), "nginx/1.18.0".to_string())]),
            body: String::new(),
            timestamp: Utc::now(),
        };

        assert!(response.is_success());
        assert_eq!(response.header("Server"), Some("nginx/1.18.0"));
        assert_eq!(response.server(), Some("nginx/1.18.0"));
        assert_eq!(response.header("content-type"), None);
    }
}
