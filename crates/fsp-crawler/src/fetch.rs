//! Page downloads with retries.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::{CrawlerConfig, RetryConfig};
use crate::error::{CrawlError, FetchError};

/// Where pages come from. The crawler only ever sees this trait.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub wait_multiplier: Duration,
    pub wait_max: Duration,
}

impl RetryPolicy {
    /// Wait before retry `n` (1-based): `min(wait_multiplier * 2^n, wait_max)`.
    pub fn backoff(&self, n: u32) -> Duration {
        let factor = 2u32.saturating_pow(n);
        self.wait_multiplier.saturating_mul(factor).min(self.wait_max)
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            wait_multiplier: Duration::from_millis(config.wait_multiplier_ms),
            wait_max: Duration::from_millis(config.wait_max_ms),
        }
    }
}

/// Runs `op` until it succeeds, fails with a non transient error, or
/// `policy.attempts` tries were made.
pub async fn with_retry<F, Fut>(policy: &RetryPolicy, url: &str, mut op: F) -> Result<String, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, FetchError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(page) => return Ok(page),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= policy.attempts => {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: Box::new(e),
                })
            }
            Err(e) => {
                let wait = policy.backoff(attempt);
                log::debug!("Retrying {url} in {wait:?} (attempt {attempt}) got: {e}");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

/// HTTP page source sharing one client (and its connection pool).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        let mut headers = config.headers.clone();
        if let Some(path) = &config.headers_file {
            let text = fs_err::read_to_string(path)
                .map_err(|e| CrawlError::Config(e.to_string()))?;
            let extra: BTreeMap<String, String> = serde_json::from_str(&text)
                .map_err(|e| CrawlError::Config(format!("{}: {e}", path.display())))?;
            headers.extend(extra);
        }

        let client = reqwest::ClientBuilder::new()
            .user_agent(&config.user_agent)
            .default_headers(header_map(&headers)?)
            .timeout(config.timeout())
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| CrawlError::Config(e.to_string()))?;

        Ok(Self {
            client,
            retry: config.retry.into(),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let page = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        match fsp_scraper::forum_message(&page) {
            Some(message) => Err(FetchError::Forum {
                url: url.to_string(),
                message,
            }),
            None => Ok(page),
        }
    }
}

impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        with_retry(&self.retry, url, || self.fetch_once(url)).await
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, CrawlError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| CrawlError::Config(format!("header {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| CrawlError::Config(format!("header {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}
