//! Observability: LLM call spans, process counters, and trace ids.
//!
//! Every LLM call gets a span with `llm.*` attributes; the root trace id is
//! minted per run and later persisted with the debate log so audits can be
//! correlated with spans. Counters are plain atomics behind a process-wide
//! static; tests read them through [`MetricsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use tracing::{info_span, Span};

use crate::json_extract::Strategy;

/// Characters kept of prompt/completion previews in span attributes.
const PREVIEW_LEN: usize = 200;

/// Mints a fresh trace id for one engine run.
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Truncates text for span attributes, marking the cut.
pub fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LEN {
        text.to_string()
    } else {
        let cut: String = text.chars().take(PREVIEW_LEN).collect();
        format!("{}...", cut)
    }
}

/// Opens the span for a single LLM generation call.
///
/// The completion preview is recorded after the call via
/// [`record_completion`] on the same span.
pub fn llm_span(provider: &str, model: &str, temperature: f32, prompt: &str) -> Span {
    info_span!(
        "llm.generate",
        llm.system = "tern",
        llm.provider = provider,
        llm.model = model,
        llm.temperature = temperature,
        llm.prompt.preview = %preview(prompt),
        llm.completion.preview = tracing::field::Empty,
    )
}

/// Records the completion preview on an LLM span.
pub fn record_completion(span: &Span, completion: &str) {
    span.record("llm.completion.preview", preview(completion).as_str());
}

/// Process-wide counters. JSON extraction strategies each get a counter so a
/// regression in model output shows up as a shift in strategy usage.
#[derive(Default)]
pub struct Metrics {
    direct_parse: AtomicU64,
    fenced_block: AtomicU64,
    balanced_braces: AtomicU64,
    repair: AtomicU64,
    regex_fallback: AtomicU64,
    runs_verified: AtomicU64,
    runs_unverified: AtomicU64,
    runs_gated: AtomicU64,
}

/// Point-in-time copy of [`Metrics`] for assertions and health output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub direct_parse: u64,
    pub fenced_block: u64,
    pub balanced_braces: u64,
    pub repair: u64,
    pub regex_fallback: u64,
    pub runs_verified: u64,
    pub runs_unverified: u64,
    pub runs_gated: u64,
}

impl Metrics {
    pub fn record_extraction(&self, strategy: Strategy) {
        let counter = match strategy {
            Strategy::DirectParse => &self.direct_parse,
            Strategy::FencedBlock => &self.fenced_block,
            Strategy::BalancedBraces => &self.balanced_braces,
            Strategy::Repair => &self.repair,
            Strategy::RegexFallback => &self.regex_fallback,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verified(&self) {
        self.runs_verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unverified(&self) {
        self.runs_unverified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gated(&self) {
        self.runs_gated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            direct_parse: self.direct_parse.load(Ordering::Relaxed),
            fenced_block: self.fenced_block.load(Ordering::Relaxed),
            balanced_braces: self.balanced_braces.load(Ordering::Relaxed),
            repair: self.repair.load(Ordering::Relaxed),
            regex_fallback: self.regex_fallback.load(Ordering::Relaxed),
            runs_verified: self.runs_verified.load(Ordering::Relaxed),
            runs_unverified: self.runs_unverified.load(Ordering::Relaxed),
            runs_gated: self.runs_gated.load(Ordering::Relaxed),
        }
    }
}

static METRICS: Lazy<Metrics> = Lazy::new(Metrics::default);

/// The process-wide metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: preview passes short text through and truncates long text with a marker.
    #[test]
    fn preview_truncates() {
        assert_eq!(preview("short"), "short");
        let long = "a".repeat(500);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_LEN + 3);
        assert!(p.ends_with("..."));
    }

    /// **Scenario**: Recording an extraction strategy increments only its counter.
    #[test]
    fn extraction_counter_increments() {
        let m = Metrics::default();
        m.record_extraction(Strategy::Repair);
        m.record_extraction(Strategy::Repair);
        m.record_extraction(Strategy::DirectParse);
        let snap = m.snapshot();
        assert_eq!(snap.repair, 2);
        assert_eq!(snap.direct_parse, 1);
        assert_eq!(snap.regex_fallback, 0);
    }

    /// **Scenario**: Trace ids are unique per call.
    #[test]
    fn trace_ids_unique() {
        assert_ne!(new_trace_id(), new_trace_id());
    }
}
