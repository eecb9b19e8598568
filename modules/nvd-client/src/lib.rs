//! Rate-limited client for the NVD 2.0 REST API.
//!
//! Every request first passes the request window in `ingest_core`. A 429 from
//! the server is answered with a fixed delay and a retry of the same request,
//! up to `max_rate_limit_retries` times. Any other error status and every
//! transport failure is returned to the caller as is.

use ingest_core::RateLimiter;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_BASE_URL: &str = "https://services.nvd.nist.gov/rest/json";
/// NVD documents the header as `apiKey`; header names are case-insensitive.
pub const API_KEY_HEADER: &str = "apikey";
/// Quota granted to callers without an API key.
pub const ANONYMOUS_RATE_LIMIT: usize = 5;
pub const ENTRIES_PAGE_MAX: usize = 10_000;
pub const CHANGED_ENTRIES_PAGE_MAX: usize = 2_000;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Requests per window when an API key is configured.
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,
    pub timeout: Duration,
    /// Pause before retrying a request the server answered with 429.
    pub retry_delay: Duration,
    pub max_rate_limit_retries: u32,
    pub entries_endpoint: String,
    pub changed_entries_endpoint: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            rate_limit_requests: 50,
            rate_limit_window: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(60),
            max_rate_limit_retries: 5,
            entries_endpoint: "cpes/2.0".to_string(),
            changed_entries_endpoint: "cves/2.0".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("api key is not a valid header value")]
    InvalidApiKey,
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("{url} still rate limited after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },
    #[error("invalid response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub total_results: usize,
    #[serde(default)]
    pub start_index: usize,
    #[serde(default)]
    pub results_per_page: usize,
    #[serde(default)]
    pub products: Vec<Value>,
    #[serde(default)]
    pub vulnerabilities: Vec<Value>,
}

impl Page {
    /// The raw wrapper objects, whichever listing this page came from.
    pub fn entries(&self) -> &[Value] {
        if self.products.is_empty() { &self.vulnerabilities } else { &self.products }
    }

    pub fn into_entries(self) -> Vec<Value> {
        if self.products.is_empty() { self.vulnerabilities } else { self.products }
    }
}

pub struct NvdClient {
    http: Client,
    config: ClientConfig,
    limiter: RateLimiter,
}

impl NvdClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        let limit = match config.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => {
                let value = HeaderValue::from_str(key).map_err(|_| ClientError::InvalidApiKey)?;
                headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
                config.rate_limit_requests
            }
            None => ANONYMOUS_RATE_LIMIT,
        };
        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .user_agent(concat!("cpe-ingest/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
            .map_err(ClientError::Build)?;
        let limiter = RateLimiter::new(limit, config.rate_limit_window);
        Ok(NvdClient { http, config, limiter })
    }

    pub fn config(&self) -> &ClientConfig { &self.config }

    pub fn rate_limiter(&self) -> &RateLimiter { &self.limiter }

    pub fn has_api_key(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// GET `base_url/endpoint` and return the JSON object body.
    pub async fn request(&mut self, endpoint: &str, params: &[(String, String)]) -> Result<Map<String, Value>, ClientError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint.trim_start_matches('/'));
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.acquire().await;
            debug!(%url, ?params, attempt, "sending request");

            let resp = self
                .http
                .get(&url)
                .query(params)
                .send()
                .await
                .map_err(|source| {
                    error!(%url, error = %source, "request failed");
                    ClientError::Transport { url: url.clone(), source }
                })?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt > self.config.max_rate_limit_retries {
                    error!(%url, attempt, "rate limited, giving up");
                    return Err(ClientError::RateLimited { url, attempts: attempt });
                }
                warn!(%url, attempt, delay_secs = self.config.retry_delay.as_secs_f64(), "rate limited by server, backing off");
                tokio::time::sleep(self.config.retry_delay).await;
                continue;
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                error!(%url, status = status.as_u16(), "http error");
                return Err(ClientError::Status { url, status: status.as_u16(), body });
            }

            let body: Value = resp
                .json()
                .await
                .map_err(|e| ClientError::Decode { url: url.clone(), reason: e.to_string() })?;
            return match body {
                Value::Object(map) => Ok(map),
                other => Err(ClientError::Decode { url, reason: format!("expected a JSON object, got {}", json_kind(&other)) }),
            };
        }
    }

    /// One page of the dictionary listing. `page_size` is capped at 10 000.
    pub async fn fetch_entries(&mut self, start_index: usize, page_size: usize) -> Result<Page, ClientError> {
        let params = page_params(start_index, page_size.min(ENTRIES_PAGE_MAX));
        let endpoint = self.config.entries_endpoint.clone();
        let body = self.request(&endpoint, &params).await?;
        decode_page(&endpoint, body)
    }

    /// One page of the change listing. `page_size` is capped at 2 000 and
    /// `filters` are appended to the query as given.
    pub async fn fetch_changed_entries(
        &mut self,
        start_index: usize,
        page_size: usize,
        filters: &[(String, String)],
    ) -> Result<Page, ClientError> {
        let mut params = page_params(start_index, page_size.min(CHANGED_ENTRIES_PAGE_MAX));
        params.extend(filters.iter().cloned());
        let endpoint = self.config.changed_entries_endpoint.clone();
        let body = self.request(&endpoint, &params).await?;
        decode_page(&endpoint, body)
    }
}

fn page_params(start_index: usize, page_size: usize) -> Vec<(String, String)> {
    vec![
        ("startIndex".to_string(), start_index.to_string()),
        ("resultsPerPage".to_string(), page_size.to_string()),
    ]
}

fn decode_page(endpoint: &str, body: Map<String, Value>) -> Result<Page, ClientError> {
    serde_json::from_value(Value::Object(body))
        .map_err(|e| ClientError::Decode { url: endpoint.to_string(), reason: e.to_string() })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
