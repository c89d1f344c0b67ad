//! Shared outbound HTTP client construction.
//!
//! One long timeout for embedding and LLM calls (large models are slow); the
//! agent tool backend uses its own shorter per-attempt timeout.

use std::time::Duration;

/// Default timeout for embedding and LLM provider calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(180);

/// Builds the shared reqwest client with the default timeout. Falls back to
/// the library default client when the builder fails (it only fails when the
/// TLS backend cannot initialize).
pub fn shared_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Client with a caller-chosen timeout (agent tool backend).
pub fn client_with_timeout(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
