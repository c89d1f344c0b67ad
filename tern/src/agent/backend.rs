//! Code-navigation and memory backend client with retry and circuit breaking.
//!
//! Backend calls retry three times with exponential backoff. A process-wide
//! circuit breaker opens after five consecutive failures for sixty seconds;
//! while open, calls return a structured fallback immediately without
//! touching the network. The breaker holds one lock, only for the counter
//! update.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::{debug, warn};

use super::tools::error_payload;

/// Consecutive failures that open the breaker.
pub const BREAKER_THRESHOLD: u32 = 5;
/// How long the breaker stays open.
pub const BREAKER_OPEN_FOR: Duration = Duration::from_secs(60);
/// Per-attempt timeout for backend calls.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
/// Backoff schedule between attempts.
const BACKOFF: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(2)];
/// Total attempts per call.
const MAX_ATTEMPTS: usize = 3;

#[derive(Default)]
struct BreakerInner {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Process-wide circuit breaker over the tool backends.
#[derive(Default)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
}

static GLOBAL_BREAKER: Lazy<Arc<CircuitBreaker>> = Lazy::new(|| Arc::new(CircuitBreaker::default()));

impl CircuitBreaker {
    /// The shared process-wide breaker.
    pub fn global() -> Arc<CircuitBreaker> {
        GLOBAL_BREAKER.clone()
    }

    /// True when a call may proceed at `now`. An expired open window closes
    /// the breaker and allows the probe call through.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.open_until {
            Some(until) if now < until => false,
            Some(_) => {
                // Recovery window elapsed; close and probe.
                inner.open_until = None;
                inner.consecutive_failures = 0;
                true
            }
            None => true,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.consecutive_failures = 0;
        inner.open_until = None;
    }

    /// Records a failure at `now`; the breaker opens on the threshold.
    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= BREAKER_THRESHOLD {
            warn!(
                failures = inner.consecutive_failures,
                "circuit breaker opened for {:?}", BREAKER_OPEN_FOR
            );
            inner.open_until = Some(now + BREAKER_OPEN_FOR);
        }
    }

    fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }
}

/// Maps a non-200 backend status to an agent-friendly payload.
fn map_status(status: u16, detail: &str) -> Value {
    match status {
        404 => error_payload("not found", "not found, try find_symbol"),
        400 => error_payload(format!("bad request: {}", detail), "check parameters"),
        503 => error_payload(
            "service temporarily unavailable",
            "temporarily unavailable, use read_file as fallback",
        ),
        other => error_payload(
            format!("backend returned {}: {}", other, detail),
            "retry later or use read_file as fallback",
        ),
    }
}

/// HTTP client for the code-navigation and memory backends.
pub struct NavClient {
    base_url: String,
    http: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
}

impl NavClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_breaker(base_url, CircuitBreaker::global())
    }

    /// Constructor with an injected breaker (tests use a private one so they
    /// cannot trip the process-wide state).
    pub fn with_breaker(base_url: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: crate::http::client_with_timeout(ATTEMPT_TIMEOUT),
            breaker,
        }
    }

    /// Calls a backend endpoint. Never errors: transport failures after all
    /// retries, open-breaker short circuits, and non-200 statuses all come
    /// back as `{error, suggestion}` payloads.
    pub async fn call(&self, endpoint: &str, payload: &Value) -> Value {
        if !self.breaker.allow() {
            debug!(endpoint = endpoint, "circuit open, short-circuiting backend call");
            return error_payload(
                "tool backend circuit is open",
                "temporarily unavailable, use read_file as fallback",
            );
        }

        let url = format!("{}/{}", self.base_url, endpoint);
        let mut last_error = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            match self.http.post(&url).json(payload).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if status == 200 {
                        self.breaker.record_success();
                        return response
                            .json::<Value>()
                            .await
                            .unwrap_or_else(|e| {
                                error_payload(
                                    format!("invalid backend response: {}", e),
                                    "check parameters",
                                )
                            });
                    }
                    let detail = response.text().await.unwrap_or_default();
                    if status >= 500 {
                        self.breaker.record_failure();
                    } else {
                        self.breaker.record_success();
                    }
                    return map_status(status, &detail);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(endpoint = endpoint, attempt = attempt + 1, error = %last_error, "backend call failed");
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(BACKOFF[attempt.min(BACKOFF.len() - 1)]).await;
                    }
                }
            }
        }
        self.breaker.record_failure();
        error_payload(
            format!("tool backend unreachable: {}", last_error),
            "temporarily unavailable, use read_file as fallback",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: After threshold failures the breaker opens; during the
    /// open window calls are blocked; after the window the next call probes.
    #[test]
    fn breaker_opens_and_recovers() {
        let breaker = CircuitBreaker::default();
        let t0 = Instant::now();

        for _ in 0..BREAKER_THRESHOLD {
            assert!(breaker.allow_at(t0));
            breaker.record_failure_at(t0);
        }
        assert!(!breaker.allow_at(t0 + Duration::from_secs(1)));
        assert!(!breaker.allow_at(t0 + Duration::from_secs(59)));
        assert!(breaker.allow_at(t0 + BREAKER_OPEN_FOR + Duration::from_secs(1)));
    }

    /// **Scenario**: A success resets the consecutive-failure count.
    #[test]
    fn success_resets_counter() {
        let breaker = CircuitBreaker::default();
        let t0 = Instant::now();
        for _ in 0..BREAKER_THRESHOLD - 1 {
            breaker.record_failure_at(t0);
        }
        breaker.record_success();
        for _ in 0..BREAKER_THRESHOLD - 1 {
            breaker.record_failure_at(t0);
        }
        assert!(breaker.allow_at(t0), "breaker must not open below threshold");
    }

    /// **Scenario**: Status mapping produces the canonical suggestions.
    #[test]
    fn status_mapping() {
        assert_eq!(map_status(404, "")["suggestion"], "not found, try find_symbol");
        assert_eq!(map_status(400, "bad field")["suggestion"], "check parameters");
        assert!(map_status(503, "")["suggestion"]
            .as_str()
            .unwrap()
            .contains("read_file as fallback"));
        assert!(map_status(500, "boom")["error"].as_str().unwrap().contains("500"));
    }

    /// **Scenario**: While the breaker is open, call() returns the fallback
    /// without touching the network (an unreachable URL would otherwise burn
    /// retries).
    #[tokio::test]
    async fn open_breaker_short_circuits() {
        let breaker = Arc::new(CircuitBreaker::default());
        let now = Instant::now();
        for _ in 0..BREAKER_THRESHOLD {
            breaker.record_failure_at(now);
        }
        let client = NavClient::with_breaker("http://127.0.0.1:1", breaker);
        let started = Instant::now();
        let out = client.call("context", &serde_json::json!({})).await;
        assert!(out["error"].as_str().unwrap().contains("circuit"));
        assert!(
            started.elapsed() < Duration::from_millis(500),
            "short circuit must not wait on backoff"
        );
    }
}
