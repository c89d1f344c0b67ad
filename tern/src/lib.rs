//! # Tern
//!
//! A retrieval-augmented QA engine with a self-correcting verification loop:
//! an optimist drafts an answer from retrieved evidence, a skeptic audits it
//! against that same evidence, and a refiner rewrites it until the audit
//! passes, the attempt budget is spent, or refinement stalls.
//!
//! ## Design principles
//!
//! - **Explicit state machine**: The verification loop is a transition table
//!   with pure decision functions ([`verify::engine::next_after_audit`],
//!   [`verify::engine::assess_refinement`]); the async body only sequences I/O.
//! - **Fail closed on verification**: An unparseable skeptic verdict is a
//!   failed audit, never a pass.
//! - **Refuse rather than hallucinate**: The relevance gate blocks generation
//!   when the best rerank score is below threshold.
//! - **Traits at the seams**: [`Generator`], [`Embedder`], [`DocumentStore`],
//!   and [`Reranker`] are object-safe traits with public mock/in-memory
//!   implementations, so every engine is testable without a network.
//!
//! ## Main modules
//!
//! - [`provider`]: [`ProviderGateway`] over the closed backend set
//!   ([`ProviderKind`]), [`Generator`], [`ToolChat`], [`MockGenerator`].
//! - [`embedding`]: [`Embedder`], [`HttpEmbeddingClient`], [`MockEmbedder`].
//! - [`store`]: [`DocumentStore`], [`ScopeFilter`], [`VectorHttpStore`],
//!   [`InMemoryDocumentStore`], [`DebateLogRecord`].
//! - [`rerank`]: [`Reranker`], sigmoid normalization, degrade-on-failure.
//! - [`retrieve`]: [`Retriever`] — scoped search, parent-document expansion,
//!   history injection, relevance gate, strict filters.
//! - [`history`]: the history pseudo-document factory and format validator.
//! - [`prompt`]: [`PromptBuilder`] for the optimist/skeptic/refiner roles.
//! - [`json_extract`]: strategy-ordered JSON recovery from LLM output.
//! - [`verify`]: [`VerifiedEngine`], [`VerificationState`], progress events.
//! - [`engines`]: [`SimpleEngine`], [`RerankingEngine`], [`QueryOutcome`].
//! - [`agent`]: [`AgentStep`], tool schema and validation, [`ToolExecutor`],
//!   circuit-broken backends.
//! - [`settings`]: configuration resolution and clamping.
//! - [`secrets`]: credential loading from the secret mount.
//! - [`observe`]: LLM spans, counters, trace ids.

pub mod agent;
pub mod document;
pub mod embedding;
pub mod engines;
pub mod error;
pub mod history;
mod http;
pub mod json_extract;
pub mod observe;
pub mod prompt;
pub mod provider;
pub mod rerank;
pub mod retrieve;
pub mod secrets;
pub mod settings;
pub mod store;
pub mod verify;

pub use agent::{AgentMessage, AgentStep, AgentStepRequest, AgentStepResponse, ToolExecutor};
pub use document::{ConversationTurn, DocMetadata, Document, SourceRef};
pub use embedding::{Embedder, HttpEmbeddingClient, MockEmbedder};
pub use engines::{QueryOutcome, QueryStatus, RerankingEngine, SimpleEngine};
pub use error::EngineError;
pub use prompt::{PromptBuilder, SkepticExamples};
pub use provider::{
    GenDefaults, GenerateRequest, Generator, MockGenerator, ProviderGateway, ProviderKind, ToolChat,
};
pub use rerank::{CrossEncoderReranker, MockReranker, Reranker};
pub use retrieve::{
    RetrieveRequest, Retrieval, Retriever, LOW_RELEVANCE_MESSAGE, NO_RELEVANT_DOCS_MESSAGE,
};
pub use secrets::SecretStore;
pub use settings::{EngineSettings, Strictness, TemperatureOverrides};
pub use store::{DebateLogRecord, DocumentStore, InMemoryDocumentStore, ScopeFilter, VectorHttpStore};
pub use verify::{ProgressCallback, ProgressEvent, ProgressEventType, SkepticAudit, VerifiedEngine};
