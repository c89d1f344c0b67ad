//! Document store: session-aware vector search, parent-document expansion,
//! and the debate-log sink.
//!
//! The store returns documents ordered by similarity (non-decreasing
//! distance); the reranker is the only component allowed to reorder them.
//! Scoping is expressed as a [`ScopeFilter`] built here so the in-memory and
//! HTTP stores cannot drift on the session semantics.

mod http;
mod memory;

pub use http::VectorHttpStore;
pub use memory::InMemoryDocumentStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::Document;
use crate::error::EngineError;

/// Session scoping for a vector search.
///
/// A document is *global* iff its `in_session` reference count is zero;
/// otherwise it belongs to exactly one session. A scoped query sees the
/// global pool plus, optionally, one session's private pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeFilter {
    /// Only documents with no session reference.
    GlobalOnly,
    /// Global documents, or documents whose session has this id.
    GlobalOrSession(String),
}

impl ScopeFilter {
    /// Builds the effective filter for an optional session id. Failure to
    /// construct the session branch (blank id) degrades to [`GlobalOnly`]
    /// rather than failing the query.
    ///
    /// [`GlobalOnly`]: ScopeFilter::GlobalOnly
    pub fn for_session(session_id: Option<&str>) -> Self {
        match session_id {
            Some(id) if !id.trim().is_empty() => ScopeFilter::GlobalOrSession(id.to_string()),
            Some(_) => {
                warn!("blank session id, degrading to global-only filter");
                ScopeFilter::GlobalOnly
            }
            None => ScopeFilter::GlobalOnly,
        }
    }

    /// Serializes to the vector store's operator-tree filter JSON
    /// (`by_ref_count` for the global branch, `by_ref` for the session one).
    pub fn to_filter_json(&self) -> serde_json::Value {
        let global = serde_json::json!({
            "path": ["in_session"],
            "operator": "ByRefCount",
            "valueInt": 0,
        });
        match self {
            ScopeFilter::GlobalOnly => global,
            ScopeFilter::GlobalOrSession(id) => serde_json::json!({
                "operator": "Or",
                "operands": [
                    global,
                    {
                        "path": ["in_session", "Session", "session_id"],
                        "operator": "ByRef",
                        "valueText": id,
                    }
                ],
            }),
        }
    }
}

/// Caps applied to long debate-log fields before persistence.
const DEBATE_TEXT_CAP: usize = 4000;
const DEBATE_CRITIQUE_CAP: usize = 2000;

/// One persisted verification transcript, keyed by trace id for post-hoc
/// evaluation against the span tree.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DebateLogRecord {
    pub query: String,
    pub draft_answer: String,
    pub skeptic_critique: String,
    pub hallucinations_found: Vec<String>,
    pub final_answer: String,
    pub was_refined: bool,
    pub is_verified: bool,
    pub attempt_count: u32,
    pub session_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub trace_id: String,
}

fn truncate_field(s: &mut String, cap: usize) {
    if s.chars().count() > cap {
        *s = s.chars().take(cap).collect();
        s.push_str("...");
    }
}

impl DebateLogRecord {
    /// Bounds every long field in place.
    pub fn truncate(mut self) -> Self {
        truncate_field(&mut self.query, DEBATE_CRITIQUE_CAP);
        truncate_field(&mut self.draft_answer, DEBATE_TEXT_CAP);
        truncate_field(&mut self.skeptic_critique, DEBATE_CRITIQUE_CAP);
        truncate_field(&mut self.final_answer, DEBATE_TEXT_CAP);
        for h in &mut self.hallucinations_found {
            truncate_field(h, DEBATE_CRITIQUE_CAP);
        }
        self
    }
}

/// Vector store seam. All methods must be safe for concurrent use from
/// parallel query tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Nearest-neighbor search under a scope filter. The result is ordered by
    /// non-decreasing distance; when `return_distance` is set, each document
    /// carries `metadata.distance`.
    async fn search_near_vector(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &ScopeFilter,
        return_distance: bool,
    ) -> Result<Vec<Document>, EngineError>;

    /// Fetches every chunk whose `parent_source` is one of `parent_ids`
    /// (parent-document expansion). Order is not significant.
    async fn fetch_by_parent_sources(
        &self,
        parent_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Document>, EngineError>;

    /// Appends one debate transcript to the verification log collection.
    async fn insert_debate_log(&self, record: DebateLogRecord) -> Result<(), EngineError>;
}
