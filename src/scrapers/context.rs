use chrono::{DateTime, Utc};
use log::debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::CrawlLimits;
use crate::http::{HttpResponse, HttpTransport};
use crate::{WhitelistError, WhitelistResult};

/// Everything one discovery attempt carries between strategies.
///
/// The transport is borrowed from the caller. The root response is fetched at
/// most once per attempt and shared by every strategy that inspects it.
pub struct ScrapeContext<'a> {
    base_url: Url,
    transport: &'a dyn HttpTransport,
    limits: CrawlLimits,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
    root: Option<Result<Arc<HttpResponse>, String>>,
    requests: usize,
    bytes: usize,
    remarks: Vec<String>,
}

impl<'a> ScrapeContext<'a> {
    pub fn new(base_url: Url, transport: &'a dyn HttpTransport) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            transport,
            limits: CrawlLimits::default(),
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
            root: None,
            requests: 0,
            bytes: 0,
            remarks: Vec::new(),
        }
    }

    pub fn with_limits(mut self, limits: CrawlLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport(&self) -> &'a dyn HttpTransport {
        self.transport
    }

    pub fn limits(&self) -> &CrawlLimits {
        &self.limits
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn requests_issued(&self) -> usize {
        self.requests
    }

    pub fn bytes_downloaded(&self) -> usize {
        self.bytes
    }

    pub fn remaining_requests(&self) -> usize {
        self.limits.max_requests.saturating_sub(self.requests)
    }

    pub(crate) fn record_request(&mut self, response: Option<&HttpResponse>) {
        self.requests += 1;
        if let Some(response) = response {
            self.bytes += response.body.len();
        }
    }

    pub fn remark<S: Into<String>>(&mut self, remark: S) {
        let remark = remark.into();
        debug!("[{}] {}", self.base_url, remark);
        self.remarks.push(remark);
    }

    pub fn remarks(&self) -> &[String] {
        &self.remarks
    }

    pub fn into_remarks(self) -> Vec<String> {
        self.remarks
    }

    /// The root listing response, fetched on first use.
    pub async fn root_response(&mut self) -> Result<Arc<HttpResponse>, String> {
        if self.root.is_none() {
            let url = self.base_url.clone();
            let fetched = fetch_cancellable(self.transport, &self.cancel, &url).await;
            self.record_request(fetched.as_ref().ok());
            self.root = Some(fetched.map(Arc::new).map_err(|e| e.to_string()));
        }

        match &self.root {
            Some(Ok(response)) => Ok(Arc::clone(response)),
            Some(Err(e)) => Err(e.clone()),
            None => Err(format!("root of {} was not fetched", self.base_url)),
        }
    }
}

/// Directory listings live under a trailing slash; without it relative child
/// links would resolve against the parent.
fn normalize_base_url(mut url: Url) -> Url {
    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

pub(crate) async fn fetch_cancellable(
    transport: &dyn HttpTransport,
    cancel: &CancellationToken,
    url: &Url,
) -> WhitelistResult<HttpResponse> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(WhitelistError::Cancelled(url.to_string())),
        response = transport.get(url) => response,
    }
}
