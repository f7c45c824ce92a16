use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

use super::{HttpResponse, HttpTransport};
use crate::{WhitelistError, WhitelistResult};

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub delay: Option<Duration>,
    pub failure: Option<String>,
    pub final_url: Option<Url>,
}

impl MockResponse {
    pub fn ok(body: &str) -> Self {
        Self::status(200).with_body(body)
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            delay: None,
            failure: None,
            final_url: None,
        }
    }

    /// A transport-level failure such as a timeout or refused connection.
    pub fn failure(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::status(0)
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Pretends the request was redirected to `url` before answering.
    pub fn with_final_url(mut self, url: Url) -> Self {
        self.final_url = Some(url);
        self
    }
}

/// In-memory transport answering from a URL → response table.
///
/// Unrouted URLs answer `404`. Every request is recorded in order.
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<RwLock<HashMap<String, MockResponse>>>,
    requests: Arc<Mutex<Vec<Url>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, url: &str, response: MockResponse) -> Self {
        self.set_route(url, response);
        self
    }

    pub fn set_route(&self, url: &str, response: MockResponse) {
        self.routes.write().insert(url.to_string(), response);
    }

    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &Url) -> WhitelistResult<HttpResponse> {
        self.requests.lock().push(url.clone());
        let response = self
            .routes
            .read()
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| MockResponse::status(404).with_body("Not Found"));

        if let Some(delay) = response.delay {
            sleep(delay).await;
        }

        if let Some(message) = response.failure {
            return Err(WhitelistError::Transport(format!("{}: {}", url, message)));
        }

        Ok(HttpResponse {
            url: response.final_url.unwrap_or_else(|| url.clone()),
            status: response.status,
            headers: response.headers.into_iter().collect(),
            body: response.body,
            timestamp: Utc::now(),
        })
    }
}
