//! Non-verified query engines and the outcome type shared by all pipelines.
//!
//! `SimpleEngine` is retrieve-and-generate over the narrow search;
//! `RerankingEngine` runs the full retriever (rerank + gate) before
//! generation. Both share the retriever, prompt builder, and provider
//! gateway with the verified engine.

use std::sync::Arc;

use tracing::info;

use crate::document::SourceRef;
use crate::error::EngineError;
use crate::prompt::PromptBuilder;
use crate::provider::{GenerateRequest, Generator};
use crate::retrieve::{format_evidence, Retrieval, RetrieveRequest, Retriever};
use crate::settings::TemperatureOverrides;

/// Terminal status of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Every claim of the answer survived the skeptic (verified engine), or
    /// the pipeline does not verify (simple/reranking).
    Verified,
    /// The loop ended exhausted or stalled; the answer carries a warning.
    Unverified,
    /// The relevance gate or strict mode refused; the answer is a canonical
    /// message.
    Gated,
}

/// Answer plus sources, as returned to the orchestrator.
#[derive(Clone, Debug, serde::Serialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub status: QueryStatus,
}

impl QueryOutcome {
    pub(crate) fn refused(message: &str) -> Self {
        Self {
            answer: message.to_string(),
            sources: Vec::new(),
            status: QueryStatus::Gated,
        }
    }
}

/// Splits retained documents into the citable evidence block and the
/// non-citable memory block. When only history survived (gate fallback), the
/// history text doubles as evidence so the optimist is not left groundless.
pub(crate) fn evidence_and_history(
    retrieval: &Retrieval,
    max_evidence_length: usize,
) -> (String, Option<String>) {
    let (history_docs, evidence_docs): (Vec<_>, Vec<_>) = retrieval
        .documents
        .iter()
        .cloned()
        .partition(|d| d.metadata.is_history);

    let history_block = if history_docs.is_empty() {
        None
    } else {
        Some(
            history_docs
                .iter()
                .map(|d| d.content.clone())
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    };

    let evidence = if evidence_docs.is_empty() {
        format_evidence(&history_docs, max_evidence_length)
    } else {
        format_evidence(&evidence_docs, max_evidence_length)
    };
    (evidence, history_block)
}

fn sources_of(retrieval: &Retrieval) -> Vec<SourceRef> {
    retrieval.documents.iter().map(SourceRef::from).collect()
}

/// Standard retrieve-augment-generate without reranking.
pub struct SimpleEngine {
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generator>,
    prompts: Arc<PromptBuilder>,
}

impl SimpleEngine {
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Arc<dyn Generator>,
        prompts: Arc<PromptBuilder>,
    ) -> Self {
        Self {
            retriever,
            generator,
            prompts,
        }
    }

    pub async fn run(
        &self,
        req: &RetrieveRequest,
        overrides: &TemperatureOverrides,
    ) -> Result<QueryOutcome, EngineError> {
        let settings = self.retriever.settings().with_overrides(overrides);
        let retrieval = self.retriever.retrieve_simple(req).await?;
        if let Some(message) = retrieval.refusal {
            return Ok(QueryOutcome::refused(message));
        }
        let (evidence, history) = evidence_and_history(&retrieval, settings.max_evidence_length);
        let prompt = self.prompts.optimist(&req.query, &evidence, history.as_deref());
        let answer = self
            .generator
            .generate(
                &GenerateRequest::new(prompt).with_temperature(settings.optimist_temperature),
            )
            .await?;
        info!(sources = retrieval.documents.len(), "simple engine run finished");
        Ok(QueryOutcome {
            answer,
            sources: sources_of(&retrieval),
            status: QueryStatus::Verified,
        })
    }
}

/// Retrieve-rerank-generate without the verification loop.
pub struct RerankingEngine {
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generator>,
    prompts: Arc<PromptBuilder>,
}

impl RerankingEngine {
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Arc<dyn Generator>,
        prompts: Arc<PromptBuilder>,
    ) -> Self {
        Self {
            retriever,
            generator,
            prompts,
        }
    }

    pub async fn run(
        &self,
        req: &RetrieveRequest,
        overrides: &TemperatureOverrides,
    ) -> Result<QueryOutcome, EngineError> {
        let settings = self.retriever.settings().with_overrides(overrides);
        let retrieval = self.retriever.retrieve_reranked(req).await?;
        if let Some(message) = retrieval.refusal {
            return Ok(QueryOutcome::refused(message));
        }
        let (evidence, history) = evidence_and_history(&retrieval, settings.max_evidence_length);
        let prompt = self.prompts.optimist(&req.query, &evidence, history.as_deref());
        let answer = self
            .generator
            .generate(
                &GenerateRequest::new(prompt).with_temperature(settings.optimist_temperature),
            )
            .await?;
        info!(sources = retrieval.documents.len(), "reranking engine run finished");
        Ok(QueryOutcome {
            answer,
            sources: sources_of(&retrieval),
            status: QueryStatus::Verified,
        })
    }
}
