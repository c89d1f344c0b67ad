//! Document and source types shared across retrieval, reranking, and engines.
//!
//! A [`Document`] is a retrieved passage: chunk content plus the identifiers
//! that group chunks into logical parents and scope them to a session.
//! Documents are created by the ingestion side and are read-only here.

use serde::{Deserialize, Serialize};

/// Per-document retrieval metadata. `distance` comes from the vector search,
/// `rerank_score` from the cross-encoder (normalized into [0,1]).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DocMetadata {
    /// Vector-search distance; smaller is more similar.
    pub distance: Option<f32>,
    /// Cross-encoder relevance in [0,1]; set by the rerank step only.
    pub rerank_score: Option<f32>,
    /// True for conversation-history pseudo-documents.
    #[serde(default)]
    pub is_history: bool,
    /// Conversation turn number for history pseudo-documents.
    pub turn_number: Option<u32>,
}

/// A retrieved passage.
///
/// `parent_source` groups chunks into a logical document for parent-document
/// expansion. Chunks with no parent are orphans and are used as-is.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub content: String,
    pub source: String,
    pub parent_source: Option<String>,
    #[serde(default)]
    pub metadata: DocMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            parent_source: None,
            metadata: DocMetadata::default(),
        }
    }

    /// Sets the parent source id (builder style).
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_source = Some(parent.into());
        self
    }

    /// Sets the vector-search distance (builder style).
    pub fn with_distance(mut self, distance: f32) -> Self {
        self.metadata.distance = Some(distance);
        self
    }
}

/// One relevant turn of prior conversation, as handed over by the
/// orchestrator's semantic memory. Turned into a pseudo-document by
/// [`crate::history::history_pseudo_document`] before reranking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub turn_number: Option<u32>,
    #[serde(default)]
    pub similarity_score: Option<f32>,
}

/// Per-document entry of a response's sources list.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl From<&Document> for SourceRef {
    fn from(d: &Document) -> Self {
        SourceRef {
            source: d.source.clone(),
            distance: d.metadata.distance,
            score: d.metadata.rerank_score,
        }
    }
}
