//! Engine error types.
//!
//! One error enum for the whole core; the serve layer maps variants to HTTP
//! status codes. Callers own retry policy — nothing in here retries.

use thiserror::Error;

/// Error returned by engine operations.
///
/// `Transport` and `UpstreamStatus`/`UpstreamSchema` describe failures of an
/// external collaborator (LLM provider, embedder, vector store, agent tool
/// backend). `Validation` is bad caller input; `Policy` is a deliberate
/// refusal (relevance gate, strict-mode empty set); `Internal` is everything
/// that should not happen.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network-level failure reaching an upstream service.
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-2xx status.
    #[error("upstream returned {status}: {detail}")]
    UpstreamStatus { status: u16, detail: String },

    /// Upstream answered 2xx but the body did not have the expected shape.
    #[error("upstream schema mismatch: {0}")]
    UpstreamSchema(String),

    /// The caller supplied invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// A policy refusal (gate / strict-mode); carries the user-facing message.
    #[error("policy refusal: {0}")]
    Policy(String),

    /// Invariant violation or unexpected internal state.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Truncates upstream detail so error bodies stay bounded and free of
    /// large payload echoes.
    pub fn upstream_status(status: u16, detail: impl Into<String>) -> Self {
        let mut detail = detail.into();
        if detail.len() > 500 {
            detail.truncate(500);
            detail.push_str("...");
        }
        EngineError::UpstreamStatus { status, detail }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            EngineError::upstream_status(status.as_u16(), e.to_string())
        } else {
            EngineError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of UpstreamStatus contains the status code and detail.
    #[test]
    fn upstream_status_display() {
        let err = EngineError::upstream_status(503, "overloaded");
        let s = err.to_string();
        assert!(s.contains("503"), "Display should contain status: {}", s);
        assert!(s.contains("overloaded"), "Display should contain detail: {}", s);
    }

    /// **Scenario**: Detail longer than the cap is truncated with an ellipsis.
    #[test]
    fn upstream_status_truncates_detail() {
        let long = "x".repeat(2000);
        let err = EngineError::upstream_status(500, long);
        match err {
            EngineError::UpstreamStatus { detail, .. } => {
                assert!(detail.len() <= 503);
                assert!(detail.ends_with("..."));
            }
            _ => panic!("expected UpstreamStatus"),
        }
    }
}
