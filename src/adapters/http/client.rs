//! Rate-limited provider client
//!
//! One client per provider. Each `call` is one logical request: required
//! parameters are checked locally, a limiter token is taken, the request is
//! sent and transient failures are retried under the configured policy.
//! Bodies of archived endpoints are handed to the response archive before
//! they are decoded.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use crate::domain::RawResponse;
use crate::ports::{FetchError, ResponseArchive};

/// Longest body excerpt carried in an error message
const MAX_ERROR_BODY: usize = 200;

/// Query parameters of one call
pub type Params = Vec<(&'static str, String)>;

/// A provider path and the query parameters it cannot do without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub required: &'static [&'static str],
    /// Keep every response body in the raw archive
    pub archive: bool,
}

impl Endpoint {
    pub const fn new(path: &'static str, required: &'static [&'static str]) -> Self {
        Self {
            path,
            required,
            archive: false,
        }
    }

    pub const fn archived(self) -> Self {
        Self {
            archive: true,
            ..self
        }
    }

    /// Reject the call when a required parameter is missing or blank
    pub fn check(&self, params: &[(&'static str, String)]) -> Result<(), FetchError> {
        for name in self.required {
            let present = params
                .iter()
                .any(|(k, v)| k == name && !v.trim().is_empty());
            if !present {
                return Err(FetchError::invalid(format!(
                    "{} requires parameter '{}'",
                    self.path, name
                )));
            }
        }
        Ok(())
    }
}

/// Provider client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Provider name used in logs
    pub provider: String,
    /// Base URL every endpoint path is appended to
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Headers sent with every request
    pub headers: Vec<(String, String)>,
    pub retry: RetryPolicy,
    /// Requests per minute, 0 disables limiting
    pub rate_limit_rpm: u32,
    pub burst: u32,
}

impl ClientConfig {
    pub fn new(provider: &str, base_url: &str) -> Self {
        Self {
            provider: provider.to_string(),
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(30),
            headers: Vec::new(),
            retry: RetryPolicy::default(),
            rate_limit_rpm: 0,
            burst: 1,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limit(mut self, rpm: u32, burst: u32) -> Self {
        self.rate_limit_rpm = rpm;
        self.burst = burst;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Provider client sharing one rate limiter across clones
#[derive(Clone)]
pub struct RateLimitedClient {
    provider: String,
    base_url: String,
    http: Client,
    retry: RetryPolicy,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    archive: Option<Arc<dyn ResponseArchive>>,
}

impl std::fmt::Debug for RateLimitedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .field("archive", &self.archive.is_some())
            .finish()
    }
}

impl RateLimitedClient {
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::invalid(format!("Bad header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::invalid(format!("Bad value for header {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::invalid(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            provider: config.provider,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            retry: config.retry,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
                config.rate_limit_rpm,
                config.burst,
            ))),
            archive: None,
        })
    }

    /// Archive the bodies of endpoints marked [`Endpoint::archived`]
    pub fn with_archive(mut self, archive: Arc<dyn ResponseArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Issue one logical GET and decode the JSON body
    pub async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        params: &[(&'static str, String)],
    ) -> Result<T, FetchError> {
        endpoint.check(params)?;

        let url = format!("{}{}", self.base_url, endpoint.path);
        let label = format!("{} {}", self.provider, endpoint.path);
        let url = url.as_str();

        let (status, body) = self
            .retry
            .run(&label, move || async move {
                self.rate_limiter.lock().await.wait_if_needed().await;

                let response = self
                    .http
                    .get(url)
                    .query(params)
                    .send()
                    .await
                    .map_err(classify_transport)?;

                let status = response.status();
                let bytes = response.bytes().await.map_err(classify_transport)?;

                if let Some(err) = classify_status(status, &bytes) {
                    return Err(err);
                }
                Ok((status, bytes))
            })
            .await?;

        tracing::debug!("{} returned {} bytes", label, body.len());
        match &self.archive {
            Some(archive) if endpoint.archive => {
                let payload: serde_json::Value = decode(&body)?;
                let raw = RawResponse::new(&self.provider, endpoint.path, status.as_u16(), payload.clone());
                // A lost archive row does not cost the structured rows
                if let Err(e) = archive.save(raw).await {
                    tracing::warn!("Failed to archive {} response: {}", label, e);
                }
                serde_json::from_value(payload).map_err(|e| FetchError::Decode(e.to_string()))
            }
            _ => decode(&body),
        }
    }

    /// Call an endpoint that wraps its payload in `{success, data}`
    pub async fn call_enveloped<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        params: &[(&'static str, String)],
    ) -> Result<T, FetchError> {
        let envelope: Envelope<T> = self.call(endpoint, params).await?;
        envelope.into_data()
    }
}

/// `{ "success": bool, "data": T, "message": ... }` wrapper
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn into_data(self) -> Result<T, FetchError> {
        if !self.success {
            return Err(FetchError::InvalidRequest {
                status: StatusCode::OK.as_u16(),
                message: self
                    .message
                    .unwrap_or_else(|| "provider reported success=false".to_string()),
            });
        }
        self.data
            .ok_or_else(|| FetchError::Decode("envelope has no data".to_string()))
    }
}

pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))
}

/// Map a non-success status to its error class; None for 2xx
pub fn classify_status(status: StatusCode, body: &[u8]) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }

    let excerpt: String = String::from_utf8_lossy(body)
        .chars()
        .take(MAX_ERROR_BODY)
        .collect();

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        return Some(FetchError::Transient(format!("{}: {}", status, excerpt)));
    }

    Some(FetchError::InvalidRequest {
        status: status.as_u16(),
        message: excerpt,
    })
}

fn classify_transport(e: reqwest::Error) -> FetchError {
    if e.is_builder() {
        FetchError::invalid(e.to_string())
    } else if e.is_decode() {
        FetchError::Decode(e.to_string())
    } else {
        FetchError::Transient(e.to_string())
    }
}
