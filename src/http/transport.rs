use async_trait::async_trait;
use chrono::Utc;
use log::trace;
use reqwest::{header, redirect, Client, ClientBuilder};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::HttpResponse;
use crate::core::DiscoveryConfig;
use crate::{WhitelistError, WhitelistResult};

const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Error)]
pub enum TransportBuildError {
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] header::InvalidHeaderName),
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] header::InvalidHeaderValue),
}

impl From<TransportBuildError> for WhitelistError {
    fn from(err: TransportBuildError) -> Self {
        WhitelistError::Config(err.to_string())
    }
}

/// GET-only HTTP access used by detection and crawling.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &Url) -> WhitelistResult<HttpResponse>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, TransportBuildError> {
        Self::with_headers(user_agent, timeout, Vec::new())
    }

    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, TransportBuildError> {
        Self::with_headers(
            &config.user_agent,
            config.request_timeout,
            config
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
        )
    }

    pub fn with_headers(
        user_agent: &str,
        timeout: Duration,
        headers: Vec<(&str, &str)>,
    ) -> Result<Self, TransportBuildError> {
        let mut header_map = header::HeaderMap::new();
        header_map.insert(header::USER_AGENT, header::HeaderValue::from_str(user_agent)?);

        for (key, value) in headers {
            let name = header::HeaderName::from_bytes(key.as_bytes())?;
            let value = header::HeaderValue::from_str(value)?;
            header_map.insert(name, value);
        }

        let client = ClientBuilder::new()
            .default_headers(header_map)
            .timeout(timeout)
            .redirect(same_origin_redirects())
            .build()?;

        Ok(Self { client })
    }

    fn extract_headers(response: &reqwest::Response) -> HashMap<String, String> {
        response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|val| (k.to_string(), val.to_string())))
            .collect()
    }
}

/// Follows redirects only while they stay on the origin of the first request.
fn same_origin_redirects() -> redirect::Policy {
    redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.stop();
        }
        let same_origin = attempt
            .previous()
            .first()
            .map(|first| first.origin() == attempt.url().origin())
            .unwrap_or(false);
        if same_origin {
            attempt.follow()
        } else {
            attempt.stop()
        }
    })
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url) -> WhitelistResult<HttpResponse> {
        let timestamp = Utc::now();
        let response = self.client.get(url.clone()).send().await?;

        let final_url = response.url().clone();
        let status = response.status().as_u16();
        let headers = Self::extract_headers(&response);
        let raw_body = response.bytes().await?;
        let body = String::from_utf8_lossy(&raw_body).into_owned();

        trace!(
            "GET {} -> {} ({} bytes, final url {})",
            url,
            status,
            raw_body.len(),
            final_url
        );

        Ok(HttpResponse {
            url: final_url,
            status,
            headers,
            body,
            timestamp,
        })
    }
}
