//! Verification loop state: audits, the accumulating state record, and the
//! structural stall check.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The skeptic's verdict for one attempt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SkepticAudit {
    pub is_verified: bool,
    pub reasoning: String,
    #[serde(default)]
    pub hallucinations: Vec<String>,
    #[serde(default)]
    pub missing_evidence: Vec<String>,
}

impl SkepticAudit {
    /// The fail-closed audit used whenever the skeptic's output cannot be
    /// parsed: never treat an unreadable verdict as a pass.
    pub fn fail_closed() -> Self {
        Self {
            is_verified: false,
            reasoning: "parse error".into(),
            hallucinations: vec!["unverifiable".into()],
            missing_evidence: vec!["rerun".into()],
        }
    }

    /// Builds an audit from an extracted JSON object. Missing or mistyped
    /// fields take safe defaults; a missing `is_verified` is false.
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let string_list = |key: &str| -> Vec<String> {
            obj.get(key)
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            is_verified: obj.get("is_verified").and_then(|v| v.as_bool()).unwrap_or(false),
            reasoning: obj
                .get("reasoning")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            hallucinations: string_list("hallucinations"),
            missing_evidence: string_list("missing_evidence"),
        }
    }
}

/// Mutable state of one verification run. Owned exclusively by the engine
/// for the duration of the run.
///
/// Invariants: `attempt_count == history.len()`; `is_final_verified` implies
/// the last audit is verified.
#[derive(Clone, Debug, Default)]
pub struct VerificationState {
    pub current_answer: String,
    pub attempt_count: u32,
    pub is_final_verified: bool,
    pub history: Vec<SkepticAudit>,
}

impl VerificationState {
    pub fn new(initial_answer: impl Into<String>) -> Self {
        Self {
            current_answer: initial_answer.into(),
            ..Default::default()
        }
    }

    pub fn add_audit(&mut self, audit: SkepticAudit) {
        self.history.push(audit);
        self.attempt_count += 1;
    }

    pub fn mark_verified(&mut self) {
        self.is_final_verified = true;
    }

    pub fn last_audit(&self) -> Option<&SkepticAudit> {
        self.history.last()
    }
}

/// Fraction of the longer answer that the shorter may undercut before the
/// two are considered incomparable for the prefix check.
const STALL_LENGTH_RATIO: f32 = 0.8;
/// Shared-prefix fraction above which two answers count as the same.
const STALL_PREFIX_RATIO: f32 = 0.95;

/// Structural similarity check behind stall detection: exact equality, or a
/// ≥95% shared prefix when the lengths are within 80% of each other. Catches
/// refiners that only tweak punctuation or re-emit the draft.
pub fn is_structurally_same(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    if len_a == 0 || len_b == 0 {
        return false;
    }
    let (shorter, longer) = if len_a <= len_b { (len_a, len_b) } else { (len_b, len_a) };
    if (shorter as f32) / (longer as f32) < STALL_LENGTH_RATIO {
        return false;
    }
    let common_prefix = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count();
    (common_prefix as f32) / (longer as f32) >= STALL_PREFIX_RATIO
}
