//! Progress events for the streaming variant of the verification loop.
//!
//! The progress run shares the state machine with the plain run; the only
//! difference is a callback side effect at each labeled transition. Callback
//! errors are logged and never abort the run.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::state::SkepticAudit;

/// Labeled transitions of the verification loop.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    RetrievalStart,
    RetrievalComplete,
    DraftStart,
    DraftComplete,
    SkepticAuditStart,
    SkepticAuditComplete,
    RefinementStart,
    RefinementComplete,
    VerificationComplete,
    Error,
}

/// Retrieval summary attached to `retrieval_complete` at verbosity 2.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetrievalDetails {
    pub document_count: usize,
    pub sources: Vec<String>,
    pub has_relevant_docs: bool,
}

/// Audit content attached to `skeptic_audit_complete` at verbosity 2.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuditDetails {
    pub is_verified: bool,
    pub reasoning: String,
    pub hallucinations: Vec<String>,
    pub missing_evidence: Vec<String>,
    /// Source indices cited in the audited answer.
    pub sources_cited: Vec<u32>,
}

impl AuditDetails {
    pub fn from_audit(audit: &SkepticAudit, sources_cited: Vec<u32>) -> Self {
        Self {
            is_verified: audit.is_verified,
            reasoning: audit.reasoning.clone(),
            hallucinations: audit.hallucinations.clone(),
            missing_evidence: audit.missing_evidence.clone(),
            sources_cited,
        }
    }
}

/// One progress event. `attempt` stays within [1, max_attempts]; events
/// before the loop report attempt 1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event_type: ProgressEventType,
    pub message: String,
    /// Milliseconds since the Unix epoch (UTC).
    pub timestamp_ms: i64,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_details: Option<RetrievalDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_details: Option<AuditDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProgressEvent {
    pub fn new(event_type: ProgressEventType, message: impl Into<String>, attempt: u32) -> Self {
        Self {
            event_type,
            message: message.into(),
            timestamp_ms: now_ms(),
            attempt,
            trace_id: None,
            retrieval_details: None,
            audit_details: None,
            error_message: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Caller-supplied async progress sink.
pub type ProgressCallback =
    Arc<dyn Fn(ProgressEvent) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Delivers one event to the callback, isolating callback failures from the
/// run.
pub(crate) async fn emit(callback: Option<&ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = callback {
        let event_type = event.event_type;
        if let Err(e) = cb(event).await {
            warn!(event = ?event_type, error = %e, "progress callback failed, continuing run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Event types serialize as snake_case labels.
    #[test]
    fn event_type_serialization() {
        let js = serde_json::to_string(&ProgressEventType::SkepticAuditComplete).unwrap();
        assert_eq!(js, "\"skeptic_audit_complete\"");
        let js = serde_json::to_string(&ProgressEventType::VerificationComplete).unwrap();
        assert_eq!(js, "\"verification_complete\"");
    }

    /// **Scenario**: Optional detail fields are omitted from JSON when unset.
    #[test]
    fn optional_fields_omitted() {
        let event = ProgressEvent::new(ProgressEventType::DraftStart, "drafting", 1);
        let js = serde_json::to_string(&event).unwrap();
        assert!(!js.contains("retrieval_details"));
        assert!(!js.contains("error_message"));
        assert!(js.contains("\"attempt\":1"));
    }

    /// **Scenario**: A failing callback does not propagate (the run continues).
    #[tokio::test]
    async fn callback_error_is_swallowed() {
        let cb: ProgressCallback =
            Arc::new(|_ev| Box::pin(async { Err("sink closed".to_string()) }));
        emit(Some(&cb), ProgressEvent::new(ProgressEventType::Error, "x", 1)).await;
    }
}
