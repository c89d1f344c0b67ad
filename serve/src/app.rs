//! Axum app: engine state, router, and error mapping.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::error;

use tern::{
    AgentStep, EngineError, EngineSettings, GenDefaults, HttpEmbeddingClient, PromptBuilder,
    ProviderGateway, ProviderKind, RerankingEngine, Retriever, SecretStore, SimpleEngine,
    SkepticExamples, VectorHttpStore, VerifiedEngine,
};

use super::agent::agent_step;
use super::rag::{rag_query, rag_retrieve};
use super::types::ErrorResponse;

/// Shared engine handles; everything inside is thread-safe and cheap to clone
/// behind the Arc.
#[derive(Clone)]
pub struct AppState {
    pub simple: Arc<SimpleEngine>,
    pub reranking: Arc<RerankingEngine>,
    pub verified: Arc<VerifiedEngine>,
    pub retriever: Arc<Retriever>,
    pub agent: Arc<AgentStep>,
}

impl AppState {
    /// Builds the full engine stack from environment configuration and the
    /// secret mount. Call after `config::load_and_apply`.
    pub fn from_env() -> Result<Self, EngineError> {
        let env = |key: &str| std::env::var(key).ok();
        let settings = EngineSettings::from_env();
        let secrets = env("SECRETS_DIR")
            .map(SecretStore::new)
            .unwrap_or_else(SecretStore::mounted);

        let backend: ProviderKind = env("LLM_BACKEND_TYPE")
            .unwrap_or_else(|| "ollama".to_string())
            .parse()
            .map_err(EngineError::Validation)?;
        let (base_url, model) = match backend {
            ProviderKind::Ollama => (
                env("OLLAMA_BASE_URL").unwrap_or_else(|| "http://localhost:11434".into()),
                env("OLLAMA_MODEL").unwrap_or_else(|| "llama3".into()),
            ),
            ProviderKind::OpenAi => (
                env("OPENAI_URL_BASE").unwrap_or_else(|| "https://api.openai.com/v1".into()),
                env("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
            ),
            ProviderKind::Anthropic => (
                env("ANTHROPIC_URL_BASE").unwrap_or_else(|| "https://api.anthropic.com".into()),
                env("ANTHROPIC_MODEL").unwrap_or_else(|| "claude-3-haiku-20240307".into()),
            ),
            ProviderKind::LlamaCpp => (
                env("LLM_SERVICE_URL_BASE")
                    .ok_or_else(|| EngineError::Validation("LLM_SERVICE_URL_BASE not set".into()))?,
                String::new(),
            ),
        };
        let mut gateway = ProviderGateway::new(backend, base_url, model)
            .with_defaults(GenDefaults::from_env());
        let key_name = match backend {
            ProviderKind::OpenAi => Some("openai_api_key"),
            ProviderKind::Anthropic => Some("anthropic_api_key"),
            _ => None,
        };
        if let Some(name) = key_name {
            if let Some(key) = secrets.read(name) {
                gateway = gateway.with_api_key(key);
            }
        }
        if let Some(budget) = env("ANTHROPIC_THINKING_BUDGET").and_then(|v| v.parse().ok()) {
            gateway = gateway.with_thinking_budget(budget);
        }
        let gateway = Arc::new(gateway);

        let mut embedding_client = HttpEmbeddingClient::new(
            env("EMBEDDING_SERVICE_URL")
                .ok_or_else(|| EngineError::Validation("EMBEDDING_SERVICE_URL not set".into()))?,
            env("EMBEDDING_MODEL").unwrap_or_else(|| "nomic-embed-text".into()),
        );
        if let Some(dims) = env("EMBEDDING_DIMENSION").and_then(|v| v.parse().ok()) {
            embedding_client = embedding_client.with_dimension(dims);
        }
        let embedder = Arc::new(embedding_client);
        let store = Arc::new(VectorHttpStore::new(
            env("VECTOR_STORE_URL")
                .ok_or_else(|| EngineError::Validation("VECTOR_STORE_URL not set".into()))?,
        ));
        let reranker = env("RERANKER_URL").map(|url| {
            Arc::new(tern::CrossEncoderReranker::new(
                url,
                env("RERANKER_MODEL")
                    .unwrap_or_else(|| "cross-encoder/ms-marco-MiniLM-L-6-v2".into()),
            )) as Arc<dyn tern::Reranker>
        });

        let retriever = Arc::new(Retriever::new(
            embedder,
            store.clone(),
            reranker,
            settings.clone(),
        ));
        let prompts = Arc::new(PromptBuilder::new(
            settings.strictness,
            SkepticExamples::load(settings.skeptic_examples_path.as_deref()),
        ));

        Ok(Self {
            simple: Arc::new(SimpleEngine::new(
                retriever.clone(),
                gateway.clone(),
                prompts.clone(),
            )),
            reranking: Arc::new(RerankingEngine::new(
                retriever.clone(),
                gateway.clone(),
                prompts.clone(),
            )),
            verified: Arc::new(VerifiedEngine::new(
                retriever.clone(),
                gateway.clone(),
                prompts,
                store,
            )),
            retriever,
            agent: Arc::new(AgentStep::new(gateway)),
        })
    }
}

/// Builds the API router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rag/:pipeline", post(rag_query))
        .route("/rag/retrieve/:pipeline", post(rag_retrieve))
        .route("/agent/step", post(agent_step))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Maps engine errors to HTTP statuses. Policy refusals never reach here
/// (they are 200 outcomes); upstream trouble is a bad gateway.
pub(crate) fn error_response(e: EngineError) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %e, "request failed");
    let status = match &e {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::Transport(_)
        | EngineError::UpstreamStatus { .. }
        | EngineError::UpstreamSchema(_) => StatusCode::BAD_GATEWAY,
        EngineError::Policy(_) | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}
