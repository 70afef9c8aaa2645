//! Rate-limited HTTP fetcher shared by the market-data adapters
//!
//! One fetcher per upstream API. Requests are spaced by a minimum interval and
//! an optional per-minute quota; failures are classified into [`FetchError`]
//! and retried by [`with_retry`] according to a [`RetryPolicy`].

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_ERROR_BODY: usize = 300;
const QUOTA_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("empty response: {0}")]
    Empty(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("upstream error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// Everything except an explicit "not found" is treated as transient
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::RetriesExhausted { .. })
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Delay applied after a rate-limit (429) response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `attempt * step`
    Linear(Duration),
    Fixed(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Linear(step) => step.saturating_mul(attempt.max(1)),
            Self::Fixed(delay) => *delay,
        }
    }
}

/// How long and how often to retry one logical fetch.
///
/// `max_attempts: None` together with `max_elapsed: None` retries forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub max_elapsed: Option<Duration>,
    pub rate_limit_backoff: Backoff,
    pub transient_delay: Duration,
    /// Upper bound of the random delay added to every transient retry
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn unbounded(rate_limit_backoff: Backoff) -> Self {
        Self {
            max_attempts: None,
            max_elapsed: None,
            rate_limit_backoff,
            transient_delay: Duration::from_millis(200),
            jitter: Duration::from_millis(200),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    pub fn with_transient_delay(mut self, delay: Duration, jitter: Duration) -> Self {
        self.transient_delay = delay;
        self.jitter = jitter;
        self
    }

    fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self.max_elapsed.is_some_and(|max| elapsed >= max)
    }

    fn delay_for(&self, error: &FetchError, attempt: u32) -> Duration {
        if error.is_rate_limit() {
            return self.rate_limit_backoff.delay(attempt);
        }
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.transient_delay + Duration::from_millis(jitter)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or `policy` is exhausted.
pub async fn with_retry<T, F, Fut>(
    source: &str,
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        if policy.exhausted(attempt, started.elapsed()) {
            warn!(source, what, attempt, error = %error, "Giving up fetch");
            return Err(FetchError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(error),
            });
        }

        let delay = policy.delay_for(&error, attempt);
        warn!(
            source,
            what,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Fetch failed, retrying"
        );
        sleep(delay).await;
    }
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

/// Request pacing for one upstream API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    pub min_spacing: Duration,
    pub per_minute: Option<u32>,
}

struct Pacer {
    config: PacingConfig,
    last_request: Option<Instant>,
    window_start: Option<Instant>,
    window_count: u32,
}

impl Pacer {
    fn new(config: PacingConfig) -> Self {
        Self {
            config,
            last_request: None,
            window_start: None,
            window_count: 0,
        }
    }

    /// Reserve the next request slot; returns how long to wait from `now`.
    fn reserve(&mut self, now: Instant) -> Duration {
        let mut at = now;

        if let Some(limit) = self.config.per_minute {
            let start = *self.window_start.get_or_insert(now);
            if at.duration_since(start) >= QUOTA_WINDOW {
                self.window_start = Some(at);
                self.window_count = 0;
            } else if self.window_count >= limit {
                at = start + QUOTA_WINDOW;
                self.window_start = Some(at);
                self.window_count = 0;
            }
        }

        if let Some(last) = self.last_request {
            let earliest = last + self.config.min_spacing;
            if earliest > at {
                at = earliest;
            }
        }

        self.last_request = Some(at);
        self.window_count += 1;
        at.duration_since(now)
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP GET client for one market-data provider
pub struct RateLimitedFetcher {
    name: String,
    client: Client,
    headers: HeaderMap,
    pacer: Mutex<Pacer>,
}

impl RateLimitedFetcher {
    pub fn new(name: impl Into<String>, pacing: PacingConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Self {
            name: name.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            headers,
            pacer: Mutex::new(Pacer::new(pacing)),
        }
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_bearer(mut self, token: Option<&str>) -> Self {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return self;
        };
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(value) => {
                self.headers.insert(AUTHORIZATION, value);
            }
            Err(e) => warn!(source = %self.name, error = %e, "Ignoring invalid API key"),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn pace(&self) {
        let wait = self.pacer.lock().await.reserve(Instant::now());
        if !wait.is_zero() {
            debug!(source = %self.name, wait_ms = wait.as_millis() as u64, "Pacing request");
            sleep(wait).await;
        }
    }

    /// One paced GET, decoded as `T`. No retries.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        self.pace().await;
        debug!(source = %self.name, url, "GET");

        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .query(query)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        classify_response(&self.name, status, &body)
    }
}

/// Map an HTTP status and body to a decoded payload or a classified error
pub(crate) fn classify_response<T: DeserializeOwned>(
    source: &str,
    status: StatusCode,
    body: &str,
) -> Result<T, FetchError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited(source.to_string()));
    }
    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound(format!("{source}: {}", truncate(body))));
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            body: truncate(body),
        });
    }
    if body.trim().is_empty() {
        return Err(FetchError::Empty(format!("{source}: empty body")));
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("{source}: {e}")))?;
    if value.is_null() {
        return Err(FetchError::Empty(format!("{source}: null payload")));
    }
    if let Some(message) = not_found_message(&value) {
        return Err(FetchError::NotFound(format!("{source}: {message}")));
    }

    serde_json::from_value(value).map_err(|e| FetchError::Malformed(format!("{source}: {e}")))
}

/// Providers signal unknown assets with a `msg` / `message` / `error` text
fn not_found_message(value: &Value) -> Option<String> {
    ["msg", "message", "error"].iter().find_map(|key| {
        value
            .get(*key)
            .and_then(Value::as_str)
            .filter(|text| text.to_lowercase().contains("not found"))
            .map(str::to_string)
    })
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, serde::Deserialize)]
    struct Payload {
        value: u32,
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::unbounded(Backoff::Linear(Duration::from_secs(2)))
            .with_transient_delay(Duration::from_millis(200), Duration::ZERO)
    }

    #[test]
    fn test_classify_rate_limit_and_not_found() {
        let err = classify_response::<Payload>("me", StatusCode::TOO_MANY_REQUESTS, "").unwrap_err();
        assert!(err.is_rate_limit());

        let err = classify_response::<Payload>("me", StatusCode::NOT_FOUND, "nope").unwrap_err();
        assert!(err.is_not_found());

        let err = classify_response::<Payload>(
            "me",
            StatusCode::OK,
            r#"{"msg":"Collection not found"}"#,
        )
        .unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_transient_shapes() {
        let err = classify_response::<Payload>("dex", StatusCode::OK, "null").unwrap_err();
        assert!(matches!(err, FetchError::Empty(_)));

        let err = classify_response::<Payload>("dex", StatusCode::OK, "  ").unwrap_err();
        assert!(matches!(err, FetchError::Empty(_)));

        let err = classify_response::<Payload>("dex", StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));

        let err =
            classify_response::<Payload>("dex", StatusCode::BAD_GATEWAY, "upstream").unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 502, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_success() {
        let payload: Payload =
            classify_response("dex", StatusCode::OK, r#"{"value": 7}"#).unwrap();
        assert_eq!(payload.value, 7);
    }

    #[test]
    fn test_linear_backoff_escalates() {
        let backoff = Backoff::Linear(Duration::from_secs(2));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(6));
        assert_eq!(
            Backoff::Fixed(Duration::from_secs(65)).delay(4),
            Duration::from_secs(65)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", &policy(), "asset", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 4 {
                Err(FetchError::Empty("not indexed yet".into()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("test", &policy(), "asset", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::NotFound("unknown symbol".into()))
        })
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_attempts_surface_last_error() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result: Result<(), _> =
            with_retry("test", &policy().with_max_attempts(3), "asset", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::RateLimited("test".into()))
            })
            .await;

        match result.unwrap_err() {
            FetchError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.is_rate_limit());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s + 4s of rate-limit backoff between the three attempts
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_millis(6100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_elapsed_bounds_unlimited_attempts() {
        let calls = AtomicU32::new(0);
        let policy = policy().with_max_elapsed(Duration::from_millis(1100));
        let result: Result<(), _> = with_retry("test", &policy, "asset", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Empty("still empty".into()))
        })
        .await;

        assert!(matches!(
            result.unwrap_err(),
            FetchError::RetriesExhausted { .. }
        ));
        // Attempts at t = 0, 0.2, ... 1.2s; the last one finds the budget spent
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_enforces_min_spacing() {
        let mut pacer = Pacer::new(PacingConfig {
            min_spacing: Duration::from_millis(500),
            per_minute: None,
        });
        let now = Instant::now();

        assert_eq!(pacer.reserve(now), Duration::ZERO);
        assert_eq!(pacer.reserve(now), Duration::from_millis(500));
        assert_eq!(pacer.reserve(now), Duration::from_millis(1000));
        assert_eq!(
            pacer.reserve(now + Duration::from_secs(5)),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_enforces_minute_quota() {
        let mut pacer = Pacer::new(PacingConfig {
            min_spacing: Duration::ZERO,
            per_minute: Some(3),
        });
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(pacer.reserve(now), Duration::ZERO);
        }
        // Fourth request waits for the window to roll over
        assert_eq!(pacer.reserve(now), QUOTA_WINDOW);
        // New window already holds one request
        assert_eq!(pacer.reserve(now + QUOTA_WINDOW), Duration::ZERO);
    }
}
