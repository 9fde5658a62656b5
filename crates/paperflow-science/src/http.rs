use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::multipart::Form;
use reqwest::{Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::{Result, ScienceError};

// ─── HostThrottle ─────────────────────────────────────────────────────────────

/// Minimum spacing between requests to the same host, shared by every
/// client holding a clone.
///
/// Requests to different hosts do not wait on each other.
#[derive(Clone, Default)]
pub struct HostThrottle {
    slots: Arc<StdMutex<HashMap<String, Arc<Mutex<Option<Instant>>>>>>,
}

impl HostThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, host: &str) -> Arc<Mutex<Option<Instant>>> {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(slots.entry(host.to_string()).or_default())
    }

    pub async fn wait(&self, host: &str, min_interval: Duration) {
        let slot = self.slot(host);
        let mut last = slot.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < min_interval {
                sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub fn host_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

// ─── RateLimitedClient ────────────────────────────────────────────────────────

/// A downloaded body and its declared content type.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// HTTP client that spaces requests per host.
///
/// GETs are retried on 429 (honouring `Retry-After`) and on transport
/// errors with exponential backoff. POST and PATCH are sent once.
#[derive(Clone)]
pub struct RateLimitedClient {
    client: reqwest::Client,
    throttle: HostThrottle,
    min_interval: Duration,
    max_retries: u32,
}

impl RateLimitedClient {
    pub fn new(throttle: HostThrottle, min_interval: Duration, max_retries: u32, user_agent: &str) -> Result<Self> {
        Self::with_headers(throttle, min_interval, max_retries, user_agent, HeaderMap::new())
    }

    /// Every request carries `headers` (e.g. `Authorization`).
    pub fn with_headers(
        throttle: HostThrottle,
        min_interval: Duration,
        max_retries: u32,
        user_agent: &str,
        headers: HeaderMap,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            throttle,
            min_interval,
            max_retries,
        })
    }

    pub fn throttle(&self) -> &HostThrottle {
        &self.throttle
    }

    async fn wait_for_rate_limit(&self, url: &str) {
        self.throttle.wait(&host_key(url), self.min_interval).await;
    }

    async fn send_get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit(url).await;
            let resp = self.client.get(url).query(query).send().await;
            match resp {
                Ok(r) if r.status() == 429 => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(60);
                    if attempt >= self.max_retries {
                        return Err(ScienceError::RateLimit(host_key(url), wait));
                    }
                    tracing::warn!(url, wait, "rate limited, backing off");
                    sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                }
                Ok(r) if !r.status().is_success() => return Err(api_error(url, r).await),
                Ok(r) => return Ok(r),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(ScienceError::Http(e));
                    }
                    let backoff = 2u64.pow(attempt);
                    tracing::debug!(url, backoff, error = %e, "transport error, retrying");
                    sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.get_with_query(url, &[]).await
    }

    pub async fn get_with_query(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let resp = self.send_get(url, query).await?;
        resp.text().await.map_err(ScienceError::Http)
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Download> {
        let resp = self.send_get(url, &[]).await?;
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await?.to_vec();
        Ok(Download { bytes, content_type })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_with_query(url, &[]).await
    }

    pub async fn get_json_with_query<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let text = self.get_with_query(url, query).await?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(format!("{url}: {e}")))
    }

    /// Multipart POST, sent once. Returns the raw response body.
    pub async fn post_multipart(&self, url: &str, form: Form) -> Result<String> {
        self.wait_for_rate_limit(url).await;
        let resp = self.client.post(url).multipart(form).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(url, resp).await);
        }
        resp.text().await.map_err(ScienceError::Http)
    }

    /// JSON PATCH, sent once.
    pub async fn patch_json<B: Serialize + ?Sized, R: DeserializeOwned>(&self, url: &str, body: &B) -> Result<R> {
        self.wait_for_rate_limit(url).await;
        let resp = self.client.patch(url).json(body).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(url, resp).await);
        }
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(format!("{url}: {e}")))
    }
}

async fn api_error(url: &str, resp: Response) -> ScienceError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ScienceError::ApiError(url.to_string(), format!("HTTP {status}: {body}"))
}

pub fn auth_headers(scheme: &str, token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("{scheme} {token}"))
        .map_err(|e| ScienceError::Config(format!("invalid token: {e}")))?;
    headers.insert(reqwest::header::AUTHORIZATION, value);
    Ok(headers)
}
