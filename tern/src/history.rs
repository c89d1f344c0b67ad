//! Conversation history as pseudo-documents.
//!
//! Relevant prior turns are reshaped as [`Document`]s so they compete with
//! retrieved chunks during reranking. The format is a contract between this
//! factory (the only producer) and the reranker/prompt consumers; the
//! validator keeps the two sides from drifting.

use tracing::debug;

use crate::document::{ConversationTurn, DocMetadata, Document};
use crate::error::EngineError;

/// Source-id prefix for every history pseudo-document.
pub const HISTORY_SOURCE_PREFIX: &str = "conversation_history_turn_";

/// Builds the pseudo-document for one conversation turn. Answers longer than
/// `answer_max_chars` are truncated with an ellipsis marker.
pub fn history_pseudo_document(turn: &ConversationTurn, answer_max_chars: usize) -> Document {
    let mut answer = turn.answer.clone();
    if answer.chars().count() > answer_max_chars {
        answer = answer.chars().take(answer_max_chars).collect();
        answer.push_str("...");
    }
    let turn_label = turn
        .turn_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    Document {
        content: format!("Previous conversation:\nQ: {}\nA: {}", turn.question, answer),
        source: format!("{}{}", HISTORY_SOURCE_PREFIX, turn_label),
        parent_source: None,
        metadata: DocMetadata {
            distance: None,
            rerank_score: None,
            is_history: true,
            turn_number: turn.turn_number,
        },
    }
}

/// Converts every turn and appends the pseudo-documents after the retrieved
/// documents (retrieved evidence keeps positional priority).
pub fn inject_history(
    mut documents: Vec<Document>,
    history: &[ConversationTurn],
    answer_max_chars: usize,
) -> Vec<Document> {
    if history.is_empty() {
        return documents;
    }
    documents.extend(
        history
            .iter()
            .map(|turn| history_pseudo_document(turn, answer_max_chars)),
    );
    debug!(turns = history.len(), "injected history pseudo-documents");
    documents
}

/// Format-contract check for a history pseudo-document. Consumers call this
/// in tests (and the retriever in debug builds) so a producer change that
/// breaks the shape fails loudly instead of silently degrading rerank input.
pub fn validate_history_document(doc: &Document) -> Result<(), EngineError> {
    if !doc.metadata.is_history {
        return Err(EngineError::Validation("history document missing is_history flag".into()));
    }
    if !doc.source.starts_with(HISTORY_SOURCE_PREFIX) {
        return Err(EngineError::Validation(format!(
            "history source must start with {}: {}",
            HISTORY_SOURCE_PREFIX, doc.source
        )));
    }
    if doc.content.is_empty() {
        return Err(EngineError::Validation("history document has empty content".into()));
    }
    Ok(())
}
