//! Request engine for the Mattermost REST API.
//!
//! Turns a (method, endpoint, payload) tuple into a response or a typed
//! failure, enforcing a minimum inter-request interval and retrying
//! idempotent requests on transient failures with exponential backoff.
//! Mutating methods are never auto-retried; a duplicate POST would double a
//! message or a channel.

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Identifying user agent sent on every request.
pub const USER_AGENT: &str = concat!("mmost/", env!("CARGO_PKG_VERSION"));

/// Minimum gap between successive outbound requests (10 requests per second).
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// Largest shift applied when computing exponential backoff.
const MAX_BACKOFF_SHIFT: u32 = 8;

/// Retry policy for transient failures.
///
/// Only idempotent methods are retried; the status list mirrors what the
/// platform returns under load plus its rate-limit response.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Response statuses that trigger a retry.
    pub retryable_statuses: Vec<u16>,
    /// Methods that are safe to re-issue.
    pub retryable_methods: Vec<Method>,
    /// Total attempt budget, including the first try.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retryable_statuses: vec![429, 500, 502, 503, 504],
            retryable_methods: vec![Method::GET, Method::HEAD, Method::OPTIONS],
            max_attempts: 4,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Default policy with `retries` retries after the initial attempt.
    #[must_use]
    pub fn with_max_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Whether this method may be re-issued at all.
    #[must_use]
    pub fn retries_method(&self, method: &Method) -> bool {
        self.retryable_methods.contains(method)
    }

    /// Whether a response with this status, to this method, should be retried.
    #[must_use]
    pub fn retries_status(&self, method: &Method, status: StatusCode) -> bool {
        self.retries_method(method) && self.retryable_statuses.contains(&status.as_u16())
    }

    /// Backoff delay before retry number `retry_number` (1-based).
    #[must_use]
    pub fn backoff_delay(&self, retry_number: u32) -> Duration {
        let shift = retry_number.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.backoff_base.saturating_mul(1u32 << shift)
    }
}

/// HTTP engine owning the network session, pacing state, and retry policy.
#[derive(Debug)]
pub struct HttpClient {
    http: Client,
    api_url: Url,
    retry: RetryPolicy,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpClient {
    /// Build an engine from a validated configuration with default pacing
    /// and a retry budget taken from `config.max_retries`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the URL or token is missing or
    /// malformed, or if the underlying HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_policy(
            config,
            RetryPolicy::with_max_retries(config.max_retries),
            MIN_REQUEST_INTERVAL,
        )
    }

    /// Build an engine with an explicit retry policy and pacing interval.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] on invalid configuration.
    pub fn with_policy(
        config: &ClientConfig,
        retry: RetryPolicy,
        min_interval: Duration,
    ) -> Result<Self> {
        config.validate()?;

        let api_url = api_url(&config.url)?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| ClientError::Config(format!("invalid token: {e}")))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Config(format!("creating HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url,
            retry,
            min_interval,
            last_request: Mutex::new(None),
        })
    }

    /// The versioned API base URL (`<base>/api/v4/`).
    #[must_use]
    pub const fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Resolve an endpoint path against the API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the endpoint does not form a
    /// valid URL.
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        self.api_url
            .join(endpoint)
            .map_err(|e| ClientError::Config(format!("invalid endpoint '{endpoint}': {e}")))
    }

    /// Execute a request with pacing and retry, returning the raw response.
    ///
    /// Transient statuses and transport failures are retried with
    /// exponential backoff, but only for methods the policy marks safe.
    /// Every attempt counts against the pacing clock, including failed ones.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when no response was produced and
    /// [`ClientError::Api`] for a final non-success response.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        query: &[(&str, String)],
    ) -> Result<Response> {
        let url = self.endpoint_url(endpoint)?;
        let attempts = self.retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.throttle().await;

            let mut req = self.http.request(method.clone(), url.clone());
            if let Some(payload) = body {
                req = req.json(payload);
            }
            if !query.is_empty() {
                req = req.query(query);
            }

            log::debug!("{method} {url} (attempt {attempt}/{attempts})");

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if attempt < attempts && self.retry.retries_status(&method, status) {
                        log::warn!("{method} {url} returned {status}, retrying");
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Err(response_error(response).await);
                }
                Err(err) => {
                    if attempt < attempts
                        && self.retry.retries_method(&method)
                        && is_transient(&err)
                    {
                        log::warn!("{method} {url} failed ({err}), retrying");
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Err(ClientError::Transport(err.to_string()));
                }
            }
        }
    }

    /// GET request returning the parsed JSON body.
    ///
    /// # Errors
    ///
    /// Propagates request failures; returns [`ClientError::Serialization`]
    /// if the body is not valid JSON.
    pub async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self.request(Method::GET, endpoint, None, query).await?;
        parse_json(response).await
    }

    /// POST request with a JSON payload, returning the parsed JSON body.
    ///
    /// # Errors
    ///
    /// Propagates request failures; returns [`ClientError::Serialization`]
    /// if the body is not valid JSON.
    pub async fn post_json(&self, endpoint: &str, payload: &Value) -> Result<Value> {
        let response = self
            .request(Method::POST, endpoint, Some(payload), &[])
            .await?;
        parse_json(response).await
    }

    /// PUT request with a JSON payload, returning the parsed JSON body.
    ///
    /// # Errors
    ///
    /// Propagates request failures; returns [`ClientError::Serialization`]
    /// if the body is not valid JSON.
    pub async fn put_json(&self, endpoint: &str, payload: &Value) -> Result<Value> {
        let response = self
            .request(Method::PUT, endpoint, Some(payload), &[])
            .await?;
        parse_json(response).await
    }

    /// DELETE request. Returns `true` when the server accepted the deletion.
    ///
    /// # Errors
    ///
    /// Propagates request failures.
    pub async fn delete(&self, endpoint: &str) -> Result<bool> {
        self.request(Method::DELETE, endpoint, None, &[]).await?;
        Ok(true)
    }

    /// Wait out the pacing interval, then stamp the clock at send time.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn backoff(&self, completed_attempts: u32) {
        let delay = self.retry.backoff_delay(completed_attempts);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Classify a final non-success response into an API error, harvesting the
/// server's `message` field when the body parses as JSON.
pub(crate) async fn response_error(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body: Option<Value> = response.json().await.ok();
    ClientError::api(status, body)
}

/// Parse a successful response body as JSON.
pub(crate) async fn parse_json(response: Response) -> Result<Value> {
    response
        .json()
        .await
        .map_err(|e| ClientError::Serialization(format!("parsing response: {e}")))
}

/// Build the versioned API base URL from the configured server URL.
fn api_url(base: &str) -> Result<Url> {
    let mut base = base.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let parsed =
        Url::parse(&base).map_err(|e| ClientError::Config(format!("invalid server URL: {e}")))?;
    parsed
        .join("api/v4/")
        .map_err(|e| ClientError::Config(format!("invalid server URL: {e}")))
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_platform_behavior() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retryable_statuses, vec![429, 500, 502, 503, 504]);
        assert!(policy.retries_method(&Method::GET));
        assert!(policy.retries_method(&Method::HEAD));
        assert!(policy.retries_method(&Method::OPTIONS));
        assert!(!policy.retries_method(&Method::POST));
        assert!(!policy.retries_method(&Method::PUT));
        assert!(!policy.retries_method(&Method::DELETE));
    }

    #[test]
    fn mutating_methods_never_retry_even_on_retryable_status() {
        let policy = RetryPolicy::default();
        assert!(policy.retries_status(&Method::GET, StatusCode::SERVICE_UNAVAILABLE));
        assert!(policy.retries_status(&Method::GET, StatusCode::TOO_MANY_REQUESTS));
        assert!(!policy.retries_status(&Method::POST, StatusCode::SERVICE_UNAVAILABLE));
        assert!(!policy.retries_status(&Method::GET, StatusCode::NOT_FOUND));
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_shift_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(64), Duration::from_secs(256));
    }

    #[test]
    fn max_retries_maps_to_attempt_budget() {
        let policy = RetryPolicy::with_max_retries(3);
        assert_eq!(policy.max_attempts, 4);
    }

    #[test]
    fn api_url_gains_version_suffix() {
        let url = api_url("https://chat.example.com").expect("valid URL");
        assert_eq!(url.as_str(), "https://chat.example.com/api/v4/");

        let url = api_url("https://chat.example.com/").expect("valid URL");
        assert_eq!(url.as_str(), "https://chat.example.com/api/v4/");
    }
}
