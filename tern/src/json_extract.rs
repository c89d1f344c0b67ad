//! Robust JSON recovery from LLM output.
//!
//! Skeptic audits arrive as free text that is supposed to contain one JSON
//! object. Models wrap it in prose, fences, or Python literals, so extraction
//! runs a fixed ladder of strategies and records which one won. Callers fail
//! closed when every strategy misses — extraction itself never errors.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::observe;

/// Which extraction strategy produced the object. Recorded per call so
/// regressions show up as shifts in strategy usage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    DirectParse,
    FencedBlock,
    BalancedBraces,
    Repair,
    RegexFallback,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::DirectParse => "direct_parse",
            Strategy::FencedBlock => "fenced_block",
            Strategy::BalancedBraces => "balanced_braces",
            Strategy::Repair => "repair",
            Strategy::RegexFallback => "regex_fallback",
        }
    }
}

/// Extracts the first JSON object from `text`, trying strategies in order.
/// Returns the object and the winning strategy, or `None` when nothing in
/// the text parses as an object.
pub fn extract(text: &str) -> Option<(Map<String, Value>, Strategy)> {
    let cleaned = strip_non_printable(text);

    let attempts: [(Strategy, fn(&str) -> Option<Map<String, Value>>); 5] = [
        (Strategy::DirectParse, direct_parse),
        (Strategy::FencedBlock, fenced_block),
        (Strategy::BalancedBraces, balanced_braces),
        (Strategy::Repair, repair),
        (Strategy::RegexFallback, regex_fallback),
    ];

    for (strategy, f) in attempts {
        if let Some(obj) = f(&cleaned) {
            debug!(strategy = strategy.name(), "json extraction succeeded");
            observe::metrics().record_extraction(strategy);
            return Some((obj, strategy));
        }
    }
    debug!("json extraction failed on all strategies");
    None
}

/// Removes control characters while preserving `\n`, `\t`, `\r`.
fn strip_non_printable(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect()
}

fn as_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn direct_parse(text: &str) -> Option<Map<String, Value>> {
    serde_json::from_str::<Value>(text.trim()).ok().and_then(as_object)
}

/// ```json fenced block first, then any fenced block.
fn fenced_block(text: &str) -> Option<Map<String, Value>> {
    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let body = &text[start + fence.len()..];
            if let Some(end) = body.find("```") {
                if let Some(obj) = direct_parse(&body[..end]) {
                    return Some(obj);
                }
            }
        }
    }
    None
}

/// Walks braces left to right tracking depth; attempts a parse at every
/// balanced close so the first complete object wins even with trailing prose.
fn balanced_braces(text: &str) -> Option<Map<String, Value>> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut start = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start {
                            if let Some(obj) = direct_parse(&text[s..=i]) {
                                return Some(obj);
                            }
                            start = None;
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));
static BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).expect("valid regex"));

/// Repairs the most common LLM JSON defects, then retries the brace walk:
/// trailing commas, single-quoted strings (only when no double quotes are
/// present), unquoted keys, and Python literal tokens.
fn repair(text: &str) -> Option<Map<String, Value>> {
    let mut fixed = TRAILING_COMMA.replace_all(text, "$1").into_owned();

    if !fixed.contains('"') && fixed.contains('\'') {
        fixed = fixed.replace('\'', "\"");
    }

    fixed = BARE_KEY.replace_all(&fixed, "$1\"$2\":").into_owned();

    fixed = fixed
        .replace(": True", ": true")
        .replace(": False", ": false")
        .replace(": None", ": null");

    balanced_braces(&fixed).or_else(|| direct_parse(&fixed))
}

static VERDICT_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)\{[^{}]*is_verified[^{}]*\}"#).expect("valid regex"));

/// Last resort: any brace-delimited substring mentioning `is_verified`.
fn regex_fallback(text: &str) -> Option<Map<String, Value>> {
    for m in VERDICT_OBJECT.find_iter(text) {
        if let Some(obj) = direct_parse(m.as_str()).or_else(|| repair(m.as_str())) {
            return Some(obj);
        }
    }
    None
}
