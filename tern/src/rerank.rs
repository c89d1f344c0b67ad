//! Cross-encoder reranking with sigmoid-normalized scores.
//!
//! The scorer returns one raw logit per (query, passage) pair; logits are
//! squashed into [0,1] here so every downstream threshold (strict-mode score,
//! relevance gate) compares in one range. A missing or failing scorer never
//! fails retrieval: the caller degrades to the first `final_k` documents in
//! their original similarity order.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex;
use tracing::{debug, error, warn};

use crate::document::Document;
use crate::error::EngineError;

/// Logits are clamped before exp so extreme scores cannot overflow.
const LOGIT_CLAMP: f32 = 20.0;

/// Numerically safe sigmoid mapping a raw cross-encoder logit into [0,1].
pub fn sigmoid(logit: f32) -> f32 {
    let x = logit.clamp(-LOGIT_CLAMP, LOGIT_CLAMP);
    1.0 / (1.0 + (-x).exp())
}

/// Scores passages against a query. One score per passage, order-preserving,
/// already normalized into [0,1].
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, EngineError>;
}

#[derive(Deserialize)]
struct ScoreResponse {
    scores: Vec<f32>,
}

/// HTTP client for the cross-encoder scoring endpoint.
pub struct CrossEncoderReranker {
    url: String,
    model: String,
    http: reqwest::Client,
}

impl CrossEncoderReranker {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            http: crate::http::shared_client(),
        }
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, EngineError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let payload = json!({
            "model": self.model,
            "query": query,
            "passages": passages,
        });
        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::Transport(format!("reranker: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::upstream_status(status.as_u16(), detail));
        }
        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|e| EngineError::UpstreamSchema(format!("score response: {}", e)))?;
        if body.scores.len() != passages.len() {
            return Err(EngineError::UpstreamSchema(format!(
                "score/passage arity mismatch: {} scores for {} passages",
                body.scores.len(),
                passages.len()
            )));
        }
        Ok(body.scores.into_iter().map(sigmoid).collect())
    }
}

/// Scripted reranker for tests. Scores pop front per call; raw values are
/// passed through unchanged (already in [0,1] by construction in tests).
#[derive(Default)]
pub struct MockReranker {
    scripted: Mutex<Vec<Vec<f32>>>,
}

impl MockReranker {
    pub fn new(scripted: Vec<Vec<f32>>) -> Self {
        Self {
            scripted: Mutex::new(scripted),
        }
    }
}

#[async_trait]
impl Reranker for MockReranker {
    async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>, EngineError> {
        let mut scripted = self
            .scripted
            .lock()
            .map_err(|_| EngineError::Internal("mock lock poisoned".into()))?;
        if scripted.is_empty() {
            return Err(EngineError::Internal("mock reranker script exhausted".into()));
        }
        let scores = scripted.remove(0);
        if scores.len() != passages.len() {
            return Err(EngineError::UpstreamSchema(format!(
                "scripted {} scores for {} passages",
                scores.len(),
                passages.len()
            )));
        }
        Ok(scores)
    }
}

/// Reranks `documents` down to `final_k`, annotating `metadata.rerank_score`.
///
/// Degrades instead of failing: with no reranker configured, or when scoring
/// errors, the first `final_k` documents are returned in their original
/// (similarity) order without scores.
pub async fn apply_rerank(
    reranker: Option<&dyn Reranker>,
    query: &str,
    documents: Vec<Document>,
    final_k: usize,
) -> Vec<Document> {
    let reranker = match reranker {
        Some(r) => r,
        None => {
            warn!("no reranker configured, keeping first {} documents", final_k);
            return documents.into_iter().take(final_k).collect();
        }
    };
    if documents.is_empty() {
        return documents;
    }

    let passages: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
    let scores = match reranker.score(query, &passages).await {
        Ok(scores) => scores,
        Err(e) => {
            error!(error = %e, "rerank failed, degrading to first {} documents", final_k);
            return documents.into_iter().take(final_k).collect();
        }
    };

    let mut scored: Vec<(f32, Document)> = scores
        .into_iter()
        .zip(documents)
        .map(|(score, mut doc)| {
            doc.metadata.rerank_score = Some(score);
            (score, doc)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(final_k);
    debug!(kept = scored.len(), "rerank complete");
    scored.into_iter().map(|(_, d)| d).collect()
}
