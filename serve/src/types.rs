//! Wire types of the orchestrator-facing JSON API.

use serde::{Deserialize, Serialize};
use tern::{ConversationTurn, QueryOutcome, Retrieval, SourceRef, TemperatureOverrides};

fn default_strict() -> bool {
    true
}

/// Request body of `POST /rag/{pipeline}` and `POST /rag/retrieve/{pipeline}`.
#[derive(Debug, Deserialize)]
pub struct RagRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_strict")]
    pub strict_mode: bool,
    #[serde(default)]
    pub temperature_overrides: Option<TemperatureOverrides>,
    #[serde(default)]
    pub relevant_history: Vec<ConversationTurn>,
    #[serde(default)]
    pub expanded_query: Option<Vec<String>>,
}

impl RagRequest {
    pub fn to_retrieve_request(&self) -> tern::RetrieveRequest {
        tern::RetrieveRequest {
            query: self.query.clone(),
            session_id: self.session_id.clone(),
            relevant_history: self.relevant_history.clone(),
            strict_mode: self.strict_mode,
            expanded_query: self.expanded_query.clone(),
        }
    }

    pub fn overrides(&self) -> TemperatureOverrides {
        self.temperature_overrides.unwrap_or_default()
    }
}

/// Response body of `POST /rag/{pipeline}`.
#[derive(Debug, Serialize)]
pub struct RagResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

impl From<QueryOutcome> for RagResponse {
    fn from(outcome: QueryOutcome) -> Self {
        Self {
            answer: outcome.answer,
            sources: outcome.sources,
        }
    }
}

/// One chunk of `POST /rag/retrieve/{pipeline}`.
#[derive(Debug, Serialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

/// Response body of `POST /rag/retrieve/{pipeline}`.
#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub chunks: Vec<RetrievedChunk>,
    pub context_text: String,
    pub has_relevant_docs: bool,
}

impl From<Retrieval> for RetrieveResponse {
    fn from(retrieval: Retrieval) -> Self {
        Self {
            chunks: retrieval
                .documents
                .iter()
                .map(|d| RetrievedChunk {
                    content: d.content.clone(),
                    source: d.source.clone(),
                    rerank_score: d.metadata.rerank_score,
                })
                .collect(),
            context_text: retrieval.context_text,
            has_relevant_docs: retrieval.has_relevant_docs,
        }
    }
}

/// Error body; detail is already truncated by the engine error type.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
