//! The verified query engine: draft, audit, refine until verified, exhausted,
//! or stalled.
//!
//! The loop is an explicit state machine. The decision points are pure
//! functions ([`next_after_audit`], [`assess_refinement`]) so the
//! stall/empty/valid branches are unit-testable without providers; the async
//! body only sequences I/O around them. The progress variant is the same
//! loop with a callback side effect at each labeled transition.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::document::SourceRef;
use crate::engines::{evidence_and_history, QueryOutcome, QueryStatus};
use crate::error::EngineError;
use crate::json_extract;
use crate::observe;
use crate::prompt::PromptBuilder;
use crate::provider::{GenerateRequest, Generator};
use crate::retrieve::{RetrieveRequest, Retriever};
use crate::settings::TemperatureOverrides;
use crate::store::{DebateLogRecord, DocumentStore};

use super::progress::{
    emit, now_ms, AuditDetails, ProgressCallback, ProgressEvent, ProgressEventType,
    RetrievalDetails,
};
use super::state::{is_structurally_same, SkepticAudit, VerificationState};

use std::sync::Arc;

/// Suffix appended when the loop ends without a verified answer.
pub const WARNING_SUFFIX: &str = "\n\n*(Warning: Verification incomplete)*";

/// Refinements shorter than this are rejected as invalid.
const MIN_REFINED_LENGTH: usize = 10;
/// Consecutive structural stalls that terminate the loop.
const MAX_STALLS: u32 = 2;

/// How the loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminal {
    Verified,
    Exhausted,
    Stalled,
}

/// Where the loop goes after an audit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Refining,
    Done(Terminal),
}

/// Pure audit transition: verified ends the loop; otherwise refine while
/// attempts remain. `attempt_count` counts total skeptic calls, so equality
/// with `max_attempts` means the budget is spent.
pub fn next_after_audit(verified: bool, attempt_count: u32, max_attempts: u32) -> Phase {
    if verified {
        Phase::Done(Terminal::Verified)
    } else if attempt_count < max_attempts {
        Phase::Refining
    } else {
        Phase::Done(Terminal::Exhausted)
    }
}

/// Pure refinement assessment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefineDecision {
    /// Use the refined answer; `stalled` marks a structural repeat.
    Adopt { stalled: bool },
    /// Refinement was unusable; keep the previous answer.
    KeepPrevious { reason: &'static str },
}

pub fn assess_refinement(refined: &str, previous: &str) -> RefineDecision {
    let trimmed = refined.trim();
    if trimmed.is_empty() {
        return RefineDecision::KeepPrevious {
            reason: "refiner returned empty answer",
        };
    }
    if trimmed.chars().count() < MIN_REFINED_LENGTH {
        return RefineDecision::KeepPrevious {
            reason: "refined answer below minimum length",
        };
    }
    RefineDecision::Adopt {
        stalled: is_structurally_same(refined, previous),
    }
}

static SOURCE_CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[Source (\d+)\]").expect("valid regex"));

/// Source indices cited in an answer, deduplicated in first-seen order.
fn sources_cited(answer: &str) -> Vec<u32> {
    let mut seen = Vec::new();
    for cap in SOURCE_CITATION.captures_iter(answer) {
        if let Some(n) = cap.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
            if !seen.contains(&n) {
                seen.push(n);
            }
        }
    }
    seen
}

/// The self-correcting verification engine.
pub struct VerifiedEngine {
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generator>,
    prompts: Arc<PromptBuilder>,
    store: Arc<dyn DocumentStore>,
}

impl VerifiedEngine {
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Arc<dyn Generator>,
        prompts: Arc<PromptBuilder>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            retriever,
            generator,
            prompts,
            store,
        }
    }

    /// Runs the verification loop without progress streaming.
    pub async fn run(
        &self,
        req: &RetrieveRequest,
        overrides: &TemperatureOverrides,
    ) -> Result<QueryOutcome, EngineError> {
        self.run_with_progress(req, overrides, None, 1).await
    }

    /// Runs the verification loop, invoking `callback` at every labeled
    /// transition. Verbosity 2 attaches retrieval and audit details.
    pub async fn run_with_progress(
        &self,
        req: &RetrieveRequest,
        overrides: &TemperatureOverrides,
        callback: Option<ProgressCallback>,
        verbosity: u8,
    ) -> Result<QueryOutcome, EngineError> {
        let trace_id = observe::new_trace_id();
        let settings = self.retriever.settings().with_overrides(overrides);
        let cb = callback.as_ref();

        let event = |event_type, message: &str, attempt| {
            ProgressEvent::new(event_type, message, attempt).with_trace_id(trace_id.clone())
        };

        // Retrieval.
        emit(cb, event(ProgressEventType::RetrievalStart, "retrieving evidence", 1)).await;
        let retrieval = match self.retriever.retrieve_reranked(req).await {
            Ok(r) => r,
            Err(e) => {
                let mut ev = event(ProgressEventType::Error, "retrieval failed", 1);
                ev.error_message = Some(e.to_string());
                emit(cb, ev).await;
                return Err(e);
            }
        };
        {
            let mut ev = event(
                ProgressEventType::RetrievalComplete,
                &format!("retrieved {} documents", retrieval.documents.len()),
                1,
            );
            if verbosity >= 2 {
                ev.retrieval_details = Some(RetrievalDetails {
                    document_count: retrieval.documents.len(),
                    sources: retrieval.documents.iter().map(|d| d.source.clone()).collect(),
                    has_relevant_docs: retrieval.has_relevant_docs,
                });
            }
            emit(cb, ev).await;
        }

        if let Some(message) = retrieval.refusal {
            observe::metrics().record_gated();
            emit(cb, event(ProgressEventType::VerificationComplete, "gated: low relevance", 1)).await;
            info!(trace_id = %trace_id, "query gated before generation");
            return Ok(QueryOutcome::refused(message));
        }

        let (evidence, history_block) =
            evidence_and_history(&retrieval, settings.max_evidence_length);

        // Optimist draft.
        emit(cb, event(ProgressEventType::DraftStart, "drafting answer", 1)).await;
        let draft_prompt = self
            .prompts
            .optimist(&req.query, &evidence, history_block.as_deref());
        let draft = match self
            .generator
            .generate(
                &GenerateRequest::new(draft_prompt)
                    .with_temperature(settings.optimist_temperature),
            )
            .await
        {
            Ok(d) => d,
            Err(e) => {
                let mut ev = event(ProgressEventType::Error, "draft generation failed", 1);
                ev.error_message = Some(e.to_string());
                emit(cb, ev).await;
                return Err(e);
            }
        };
        emit(cb, event(ProgressEventType::DraftComplete, "draft complete", 1)).await;

        let mut state = VerificationState::new(draft.clone());
        let mut stalls: u32 = 0;
        let mut refiner_calls: u32 = 0;

        // The audit/refine loop.
        let terminal = loop {
            let attempt = state.attempt_count + 1;
            emit(cb, event(ProgressEventType::SkepticAuditStart, "skeptic auditing", attempt)).await;

            let skeptic_prompt =
                self.prompts
                    .skeptic(&req.query, &state.current_answer, &evidence);
            let mut skeptic_req = GenerateRequest::new(skeptic_prompt)
                .with_temperature(settings.skeptic_temperature);
            if let Some(model) = &settings.skeptic_model {
                skeptic_req = skeptic_req.with_model(model.clone());
            }
            let audit = match self.generator.generate(&skeptic_req).await {
                Ok(text) if !text.trim().is_empty() => match json_extract::extract(&text) {
                    Some((obj, _strategy)) => SkepticAudit::from_object(&obj),
                    None => {
                        warn!(trace_id = %trace_id, "skeptic output unparseable, failing closed");
                        SkepticAudit::fail_closed()
                    }
                },
                Ok(_) => {
                    warn!(trace_id = %trace_id, "skeptic returned empty output, failing closed");
                    SkepticAudit::fail_closed()
                }
                Err(e) => {
                    let mut ev = event(ProgressEventType::Error, "skeptic call failed", attempt);
                    ev.error_message = Some(e.to_string());
                    emit(cb, ev).await;
                    return Err(e);
                }
            };
            let cited = sources_cited(&state.current_answer);
            state.add_audit(audit.clone());
            {
                let mut ev = event(
                    ProgressEventType::SkepticAuditComplete,
                    if audit.is_verified { "audit passed" } else { "audit failed" },
                    attempt,
                );
                if verbosity >= 2 {
                    ev.audit_details = Some(AuditDetails::from_audit(&audit, cited));
                }
                emit(cb, ev).await;
            }

            match next_after_audit(audit.is_verified, state.attempt_count, settings.max_attempts) {
                Phase::Done(t) => break t,
                Phase::Refining => {}
            }

            emit(cb, event(ProgressEventType::RefinementStart, "refining answer", attempt)).await;
            let refine_prompt =
                self.prompts
                    .refiner(&req.query, &state.current_answer, &audit.hallucinations);
            let refined = match self
                .generator
                .generate(
                    &GenerateRequest::new(refine_prompt)
                        .with_temperature(settings.refiner_temperature),
                )
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    let mut ev = event(ProgressEventType::Error, "refiner call failed", attempt);
                    ev.error_message = Some(e.to_string());
                    emit(cb, ev).await;
                    return Err(e);
                }
            };
            refiner_calls += 1;

            match assess_refinement(&refined, &state.current_answer) {
                RefineDecision::KeepPrevious { reason } => {
                    warn!(trace_id = %trace_id, attempt = attempt, reason = reason, "keeping previous answer");
                }
                RefineDecision::Adopt { stalled } => {
                    if stalled {
                        stalls += 1;
                        warn!(trace_id = %trace_id, attempt = attempt, stalls = stalls, "refinement stalled");
                    } else {
                        stalls = 0;
                    }
                    state.current_answer = refined;
                }
            }
            emit(cb, event(ProgressEventType::RefinementComplete, "refinement complete", attempt)).await;

            if stalls >= MAX_STALLS {
                break Terminal::Stalled;
            }
        };

        // Terminal assembly.
        let status = match terminal {
            Terminal::Verified => {
                state.mark_verified();
                observe::metrics().record_verified();
                QueryStatus::Verified
            }
            Terminal::Exhausted | Terminal::Stalled => {
                observe::metrics().record_unverified();
                QueryStatus::Unverified
            }
        };
        let mut answer = state.current_answer.clone();
        if !state.is_final_verified {
            answer.push_str(WARNING_SUFFIX);
        }
        emit(
            cb,
            event(
                ProgressEventType::VerificationComplete,
                &format!("verification complete after {} attempts", state.attempt_count),
                state.attempt_count.max(1),
            ),
        )
        .await;
        info!(
            trace_id = %trace_id,
            terminal = ?terminal,
            attempts = state.attempt_count,
            refiner_calls = refiner_calls,
            "verified run finished"
        );

        let sources: Vec<SourceRef> = retrieval.documents.iter().map(SourceRef::from).collect();
        let outcome = QueryOutcome {
            answer,
            sources,
            status,
        };

        // Debate log, only after terminal assembly so cancelled runs persist
        // nothing. Persistence failures are logged and swallowed.
        if let Some(session_id) = &req.session_id {
            let last = state.last_audit();
            let record = DebateLogRecord {
                query: req.query.clone(),
                draft_answer: draft,
                skeptic_critique: last.map(|a| a.reasoning.clone()).unwrap_or_default(),
                hallucinations_found: last.map(|a| a.hallucinations.clone()).unwrap_or_default(),
                final_answer: outcome.answer.clone(),
                was_refined: refiner_calls > 0,
                is_verified: state.is_final_verified,
                attempt_count: state.attempt_count,
                session_id: session_id.clone(),
                timestamp: now_ms(),
                trace_id: trace_id.clone(),
            };
            if let Err(e) = self.store.insert_debate_log(record).await {
                warn!(trace_id = %trace_id, error = %e, "failed to persist debate log");
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Audit transition table — verified ends, attempts left
    /// refines, budget spent exhausts.
    #[test]
    fn audit_transitions() {
        assert_eq!(next_after_audit(true, 1, 3), Phase::Done(Terminal::Verified));
        assert_eq!(next_after_audit(false, 1, 3), Phase::Refining);
        assert_eq!(next_after_audit(false, 3, 3), Phase::Done(Terminal::Exhausted));
        assert_eq!(next_after_audit(false, 1, 1), Phase::Done(Terminal::Exhausted));
    }

    /// **Scenario**: Refinement assessment — empty and too-short keep the
    /// previous answer; repeats stall; new text adopts.
    #[test]
    fn refinement_assessment() {
        assert!(matches!(
            assess_refinement("", "previous answer text"),
            RefineDecision::KeepPrevious { .. }
        ));
        assert!(matches!(
            assess_refinement("   \n", "previous answer text"),
            RefineDecision::KeepPrevious { .. }
        ));
        assert!(matches!(
            assess_refinement("short", "previous answer text"),
            RefineDecision::KeepPrevious { .. }
        ));
        assert_eq!(
            assess_refinement("previous answer text", "previous answer text"),
            RefineDecision::Adopt { stalled: true }
        );
        assert_eq!(
            assess_refinement("a different, better answer", "previous answer text"),
            RefineDecision::Adopt { stalled: false }
        );
    }

    /// **Scenario**: Citation extraction finds indices once each, in order.
    #[test]
    fn citation_extraction() {
        let cited = sources_cited("Blue [Source 0], also [Source 2] and again [Source 0].");
        assert_eq!(cited, vec![0, 2]);
        assert!(sources_cited("no citations here").is_empty());
    }
}
