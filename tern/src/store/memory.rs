//! In-memory document store with real session-reference semantics.
//!
//! Backs the engine tests: cosine-similarity search over seeded documents,
//! the same scope-filter behavior as the HTTP store, and an inspectable
//! debate log. Not persistent.

use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::document::Document;
use crate::error::EngineError;

use super::{DebateLogRecord, DocumentStore, ScopeFilter};

struct Entry {
    document: Document,
    vector: Vec<f32>,
    /// `None` models a zero reference count on `in_session` (a global doc).
    session_id: Option<String>,
}

/// In-memory [`DocumentStore`].
#[derive(Default)]
pub struct InMemoryDocumentStore {
    entries: DashMap<usize, Entry>,
    next_id: Mutex<usize>,
    debate_logs: Mutex<Vec<DebateLogRecord>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a global document (no session reference).
    pub fn insert_global(&self, document: Document, vector: Vec<f32>) {
        self.insert(document, vector, None);
    }

    /// Seeds a session-scoped document.
    pub fn insert_session(&self, document: Document, vector: Vec<f32>, session_id: &str) {
        self.insert(document, vector, Some(session_id.to_string()));
    }

    fn insert(&self, document: Document, vector: Vec<f32>, session_id: Option<String>) {
        let id = {
            let mut guard = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
            let id = *guard;
            *guard += 1;
            id
        };
        self.entries.insert(
            id,
            Entry {
                document,
                vector,
                session_id,
            },
        );
    }

    /// Debate records inserted so far (test inspection).
    pub fn debate_logs(&self) -> Vec<DebateLogRecord> {
        self.debate_logs
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    fn matches(filter: &ScopeFilter, session_id: Option<&String>) -> bool {
        match (filter, session_id) {
            (_, None) => true,
            (ScopeFilter::GlobalOnly, Some(_)) => false,
            (ScopeFilter::GlobalOrSession(wanted), Some(actual)) => wanted == actual,
        }
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn search_near_vector(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &ScopeFilter,
        return_distance: bool,
    ) -> Result<Vec<Document>, EngineError> {
        if vector.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(f32, Document)> = self
            .entries
            .iter()
            .filter(|e| Self::matches(filter, e.value().session_id.as_ref()))
            .map(|e| {
                let entry = e.value();
                let distance = 1.0 - Self::cosine_similarity(vector, &entry.vector);
                (distance, entry.document.clone())
            })
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored
            .into_iter()
            .map(|(distance, mut doc)| {
                if return_distance {
                    doc.metadata.distance = Some(distance);
                }
                doc
            })
            .collect())
    }

    async fn fetch_by_parent_sources(
        &self,
        parent_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Document>, EngineError> {
        let docs: Vec<Document> = self
            .entries
            .iter()
            .filter(|e| {
                e.value()
                    .document
                    .parent_source
                    .as_ref()
                    .map(|p| parent_ids.contains(p))
                    .unwrap_or(false)
            })
            .take(limit)
            .map(|e| e.value().document.clone())
            .collect();
        Ok(docs)
    }

    async fn insert_debate_log(&self, record: DebateLogRecord) -> Result<(), EngineError> {
        let record = record.truncate();
        self.debate_logs
            .lock()
            .map_err(|_| EngineError::Internal("debate log lock poisoned".into()))?
            .push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: &str) -> Document {
        Document::new(format!("content of {}", source), source)
    }

    /// **Scenario**: Session scoping — a query with session id S1 sees global
    /// and S1 docs; no session sees only global; a foreign session sees only
    /// global.
    #[tokio::test]
    async fn session_scoping() {
        let store = InMemoryDocumentStore::new();
        store.insert_global(doc("global.txt"), vec![1.0, 0.0]);
        store.insert_session(doc("private.txt"), vec![1.0, 0.0], "s1");

        let s1 = store
            .search_near_vector(&[1.0, 0.0], 10, &ScopeFilter::for_session(Some("s1")), false)
            .await
            .unwrap();
        assert_eq!(s1.len(), 2);

        let anon = store
            .search_near_vector(&[1.0, 0.0], 10, &ScopeFilter::for_session(None), false)
            .await
            .unwrap();
        assert_eq!(anon.len(), 1);
        assert_eq!(anon[0].source, "global.txt");

        let s2 = store
            .search_near_vector(&[1.0, 0.0], 10, &ScopeFilter::for_session(Some("s2")), false)
            .await
            .unwrap();
        assert_eq!(s2.len(), 1);
        assert_eq!(s2[0].source, "global.txt");
    }

    /// **Scenario**: Results are ordered by non-decreasing distance and carry
    /// distances when requested.
    #[tokio::test]
    async fn ordering_and_distance() {
        let store = InMemoryDocumentStore::new();
        store.insert_global(doc("near.txt"), vec![1.0, 0.0]);
        store.insert_global(doc("far.txt"), vec![0.0, 1.0]);

        let docs = store
            .search_near_vector(&[1.0, 0.0], 10, &ScopeFilter::GlobalOnly, true)
            .await
            .unwrap();
        assert_eq!(docs[0].source, "near.txt");
        assert!(docs[0].metadata.distance.unwrap() < docs[1].metadata.distance.unwrap());
    }

    /// **Scenario**: Parent fetch returns every chunk of the named parents and
    /// skips orphans.
    #[tokio::test]
    async fn parent_fetch() {
        let store = InMemoryDocumentStore::new();
        store.insert_global(doc("a#1").with_parent("a"), vec![1.0]);
        store.insert_global(doc("a#2").with_parent("a"), vec![1.0]);
        store.insert_global(doc("b#1").with_parent("b"), vec![1.0]);
        store.insert_global(doc("orphan"), vec![1.0]);

        let docs = store
            .fetch_by_parent_sources(&["a".to_string()], 100)
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.parent_source.as_deref() == Some("a")));
    }

    /// **Scenario**: Debate logs accumulate and are readable back.
    #[tokio::test]
    async fn debate_log_roundtrip() {
        let store = InMemoryDocumentStore::new();
        let record = DebateLogRecord {
            query: "q".into(),
            draft_answer: "d".into(),
            skeptic_critique: "c".into(),
            hallucinations_found: vec![],
            final_answer: "f".into(),
            was_refined: false,
            is_verified: true,
            attempt_count: 1,
            session_id: "s".into(),
            timestamp: 123,
            trace_id: "t".into(),
        };
        store.insert_debate_log(record.clone()).await.unwrap();
        assert_eq!(store.debate_logs(), vec![record]);
    }
}
