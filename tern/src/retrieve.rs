//! Retrieval orchestration: session-scoped search, parent-document expansion,
//! history injection, cross-encoder rerank, relevance gate, strict filtering.
//!
//! The relevance gate exists to refuse rather than hallucinate: when the best
//! rerank score is below the gate threshold the engine never reaches the LLM,
//! unless conversation history can stand in as the only evidence.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::document::{ConversationTurn, Document};
use crate::embedding::Embedder;
use crate::error::EngineError;
use crate::history::{history_pseudo_document, inject_history, validate_history_document};
use crate::rerank::{apply_rerank, Reranker};
use crate::settings::EngineSettings;
use crate::store::{DocumentStore, ScopeFilter};

/// Canonical refusal when strict mode leaves no documents.
pub const NO_RELEVANT_DOCS_MESSAGE: &str =
    "No relevant documents found. The knowledge base does not contain information about this topic.";

/// Canonical refusal when the relevance gate blocks generation.
pub const LOW_RELEVANCE_MESSAGE: &str =
    "I could not find sufficiently relevant information in the knowledge base to answer this question reliably.";

/// Cap on chunks fetched during parent-document expansion.
const PARENT_FETCH_LIMIT: usize = 100;

/// One retrieval request, as handed down from the HTTP surface.
#[derive(Clone, Debug, Default)]
pub struct RetrieveRequest {
    pub query: String,
    pub session_id: Option<String>,
    pub relevant_history: Vec<ConversationTurn>,
    pub strict_mode: bool,
    /// Query-expansion variants, most specific first; the first one becomes
    /// the rerank query when present.
    pub expanded_query: Option<Vec<String>>,
}

impl RetrieveRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            strict_mode: true,
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.relevant_history = history;
        self
    }
}

/// Result of retrieval: the ranked, annotated documents plus the formatted
/// evidence block. `refusal` carries the canonical message when the gate or
/// strict mode blocked the query; `history_only` is set when the gate fell
/// back to conversation history as the only evidence.
#[derive(Clone, Debug)]
pub struct Retrieval {
    pub documents: Vec<Document>,
    pub context_text: String,
    pub has_relevant_docs: bool,
    pub history_only: bool,
    pub refusal: Option<&'static str>,
}

impl Retrieval {
    fn refused(message: &'static str) -> Self {
        Self {
            documents: Vec::new(),
            context_text: String::new(),
            has_relevant_docs: false,
            history_only: false,
            refusal: Some(message),
        }
    }
}

/// Formats the numbered evidence block handed to the prompt builder. Each
/// entry is truncated at `max_len` with an explicit marker.
pub fn format_evidence(documents: &[Document], max_len: usize) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let content = if d.content.chars().count() > max_len {
                let cut: String = d.content.chars().take(max_len).collect();
                format!("{}... [truncated]", cut)
            } else {
                d.content.clone()
            };
            format!("[Source {}] ({}):\n{}", i, d.source, content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Session-aware retriever shared by every engine.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn DocumentStore>,
    reranker: Option<Arc<dyn Reranker>>,
    settings: EngineSettings,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn DocumentStore>,
        reranker: Option<Arc<dyn Reranker>>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Shared front half: embed, scoped search, parent-document expansion.
    async fn search_expanded(
        &self,
        query: &str,
        session_id: Option<&str>,
        initial_k: usize,
    ) -> Result<Vec<Document>, EngineError> {
        let vector = self.embedder.embed(query).await?;
        let filter = ScopeFilter::for_session(session_id);
        let candidates = self
            .store
            .search_near_vector(&vector, initial_k, &filter, true)
            .await?;
        debug!(count = candidates.len(), initial_k = initial_k, "initial search complete");

        let mut parents: Vec<String> = candidates
            .iter()
            .filter_map(|d| d.parent_source.clone())
            .collect();
        parents.sort();
        parents.dedup();

        if parents.is_empty() {
            if !candidates.is_empty() {
                warn!("orphan chunks with no parent_source, keeping child chunks");
            }
            return Ok(candidates);
        }

        let expanded = self
            .store
            .fetch_by_parent_sources(&parents, PARENT_FETCH_LIMIT)
            .await?;
        info!(
            chunks = expanded.len(),
            parents = parents.len(),
            "parent-document expansion complete"
        );
        Ok(expanded)
    }

    /// Full reranking retrieval used by the reranking and verified engines.
    pub async fn retrieve_reranked(&self, req: &RetrieveRequest) -> Result<Retrieval, EngineError> {
        let s = &self.settings;
        let expanded = self
            .search_expanded(&req.query, req.session_id.as_deref(), s.rerank_initial_k)
            .await?;

        let pool = inject_history(expanded, &req.relevant_history, s.history_answer_max_chars);
        debug_assert!(pool
            .iter()
            .filter(|d| d.metadata.is_history)
            .all(|d| validate_history_document(d).is_ok()));

        let rerank_query = req
            .expanded_query
            .as_ref()
            .and_then(|v| v.first())
            .map(String::as_str)
            .unwrap_or(&req.query);

        let mut top = apply_rerank(
            self.reranker.as_deref(),
            rerank_query,
            pool,
            s.rerank_final_k,
        )
        .await;

        // Relevance gate: refuse rather than hallucinate on no-signal input.
        let mut history_only = false;
        if s.relevance_gate_enabled {
            let best = top
                .iter()
                .filter_map(|d| d.metadata.rerank_score)
                .fold(None::<f32>, |acc, v| Some(acc.map_or(v, |a| a.max(v))));
            if let Some(best) = best {
                if best < s.relevance_gate_threshold {
                    if req.relevant_history.is_empty() {
                        info!(best = best, "relevance gate refused query");
                        return Ok(Retrieval::refused(LOW_RELEVANCE_MESSAGE));
                    }
                    info!(best = best, "relevance gate: continuing on history only");
                    top.retain(|d| d.metadata.is_history);
                    if top.is_empty() {
                        top = req
                            .relevant_history
                            .iter()
                            .map(|t| history_pseudo_document(t, s.history_answer_max_chars))
                            .collect();
                    }
                    history_only = true;
                }
            }
        }

        // Strict-mode score filter; skipped on the history-only fallback so
        // the gate's decision is not re-litigated.
        if req.strict_mode && !history_only {
            let before = top.len();
            top.retain(|d| {
                d.metadata
                    .rerank_score
                    .map(|score| score >= s.rerank_score_threshold)
                    .unwrap_or(false)
            });
            info!(
                kept = top.len(),
                dropped = before - top.len(),
                threshold = s.rerank_score_threshold,
                "strict mode score filter"
            );
            if top.is_empty() {
                return Ok(Retrieval::refused(NO_RELEVANT_DOCS_MESSAGE));
            }
        }

        if top.is_empty() {
            return Ok(Retrieval::refused(NO_RELEVANT_DOCS_MESSAGE));
        }

        let context_text = format_evidence(&top, s.max_evidence_length);
        Ok(Retrieval {
            has_relevant_docs: !history_only,
            history_only,
            context_text,
            documents: top,
            refusal: None,
        })
    }

    /// Simple (non-reranking) retrieval used by the standard engine: a
    /// narrower search, distance-threshold strict filter, no gate.
    pub async fn retrieve_simple(&self, req: &RetrieveRequest) -> Result<Retrieval, EngineError> {
        let s = &self.settings;
        let mut docs = self
            .search_expanded(&req.query, req.session_id.as_deref(), s.simple_search_limit)
            .await?;

        if req.strict_mode {
            let before = docs.len();
            // Chunks added by parent expansion carry no distance; they ride
            // along with the chunk that matched.
            docs.retain(|d| {
                d.metadata
                    .distance
                    .map(|dist| dist < s.distance_threshold)
                    .unwrap_or(true)
            });
            info!(
                kept = docs.len(),
                dropped = before - docs.len(),
                threshold = s.distance_threshold,
                "strict mode distance filter"
            );
            if docs.is_empty() {
                return Ok(Retrieval::refused(NO_RELEVANT_DOCS_MESSAGE));
            }
        }

        let docs = inject_history(docs, &req.relevant_history, s.history_answer_max_chars);
        if docs.is_empty() {
            return Ok(Retrieval::refused(NO_RELEVANT_DOCS_MESSAGE));
        }

        let context_text = format_evidence(&docs, s.max_evidence_length);
        Ok(Retrieval {
            has_relevant_docs: true,
            history_only: false,
            context_text,
            documents: docs,
            refusal: None,
        })
    }
}
