//! Provider gateway: one `generate` contract over a closed set of LLM backends.
//!
//! The set of providers is a tagged enum, not a string: adding a backend means
//! adding a variant and its payload builder. Payload builders are pure
//! functions so the wire shape — in particular the call-site temperature,
//! historically the fragile path — is testable without a network.
//!
//! No retries here; the caller owns retry policy.

mod anthropic;
mod llamacpp;
mod mock;
mod ollama;
mod openai;

pub use mock::{MockGenerator, MockToolChat};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn, Instrument};

use crate::agent::{AgentMessage, ToolSpec};
use crate::error::EngineError;
use crate::observe;
use crate::settings::clamp_temperature;

/// The closed set of supported LLM backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    /// Local ollama-style server (`/api/generate`, `options` block).
    Ollama,
    /// OpenAI-style chat completions (`/chat/completions`).
    OpenAi,
    /// Anthropic messages (`/v1/messages`, optional thinking mode).
    Anthropic,
    /// llama.cpp-style completion server (`/completion`).
    LlamaCpp,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::LlamaCpp => "llamacpp",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "llamacpp" | "local" => Ok(Self::LlamaCpp),
            _ => Err(format!(
                "unknown provider: {} (use ollama, openai, anthropic, or llamacpp)",
                s
            )),
        }
    }
}

/// One generation request. Per-call `model` and `temperature` take precedence
/// over the gateway's instance defaults.
#[derive(Clone, Debug, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Fully-resolved generation parameters fed to a payload builder.
#[derive(Clone, Debug)]
pub struct ResolvedParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_k: u32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

/// Instance defaults below the per-call overrides. `temperature` here is the
/// environment-or-built-in default; engines pass role temperatures per call.
#[derive(Clone, Debug)]
pub struct GenDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_k: u32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

impl Default for GenDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_tokens: 1024,
            top_k: 40,
            top_p: 0.9,
            stop: Vec::new(),
        }
    }
}

impl GenDefaults {
    /// Environment-derived defaults; unset or invalid keys keep built-ins.
    pub fn from_env() -> Self {
        let d = Self::default();
        let parse_f32 = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<f32>().ok());
        let parse_u32 = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<u32>().ok());
        let stop = std::env::var("LLM_DEFAULT_STOP_SEQUENCES")
            .ok()
            .and_then(|v| serde_json::from_str::<Vec<String>>(&v).ok())
            .unwrap_or(d.stop);
        Self {
            temperature: parse_f32("LLM_DEFAULT_TEMPERATURE")
                .map(clamp_temperature)
                .unwrap_or(d.temperature),
            max_tokens: parse_u32("LLM_DEFAULT_MAX_TOKENS").unwrap_or(d.max_tokens),
            top_k: parse_u32("LLM_DEFAULT_TOP_K").unwrap_or(d.top_k),
            top_p: parse_f32("LLM_DEFAULT_TOP_P").unwrap_or(d.top_p),
            stop,
        }
    }
}

/// Text generation seam used by every engine. Implemented by
/// [`ProviderGateway`] for real backends and by [`MockGenerator`] in tests.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> Result<String, EngineError>;
}

/// One normalized tool call out of a chat-with-tools response.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedToolCall {
    pub id: String,
    pub name: String,
    /// Raw arguments; either an object or a JSON-encoded string depending on
    /// the backend. The agent step parses string-encoded args best-effort.
    pub args: Value,
}

/// Normalized chat-with-tools response shared across providers.
#[derive(Clone, Debug, Default)]
pub struct ChatOutcome {
    pub content: String,
    pub tool_calls: Vec<NormalizedToolCall>,
    /// Provider-native message, kept for history reconstruction.
    pub raw: Option<Value>,
}

/// Chat seam for the agent step: full message history plus a tool schema in,
/// normalized outcome out.
#[async_trait]
pub trait ToolChat: Send + Sync {
    async fn chat_step(
        &self,
        messages: &[AgentMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatOutcome, EngineError>;
}

/// Gateway to one configured LLM backend.
pub struct ProviderGateway {
    kind: ProviderKind,
    base_url: String,
    model: String,
    api_key: Option<String>,
    defaults: GenDefaults,
    /// Anthropic thinking budget in tokens; when set, generation requests
    /// carry `temperature: null` plus the thinking block.
    thinking_budget: Option<u32>,
    http: reqwest::Client,
}

impl ProviderGateway {
    pub fn new(kind: ProviderKind, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            defaults: GenDefaults::default(),
            thinking_budget: None,
            http: crate::http::shared_client(),
        }
    }

    /// Sets the API key (read from the secret store, never the environment).
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets instance generation defaults (typically [`GenDefaults::from_env`]).
    pub fn with_defaults(mut self, defaults: GenDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Enables anthropic thinking mode with the given token budget.
    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = Some(budget);
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Resolves per-call parameters against instance defaults: request >
    /// instance > environment-derived default. Temperature is clamped at
    /// this boundary.
    pub fn resolve_params(&self, req: &GenerateRequest) -> ResolvedParams {
        ResolvedParams {
            model: req.model.clone().unwrap_or_else(|| self.model.clone()),
            temperature: clamp_temperature(req.temperature.unwrap_or(self.defaults.temperature)),
            max_tokens: req.max_tokens.unwrap_or(self.defaults.max_tokens),
            top_k: req.top_k.unwrap_or(self.defaults.top_k),
            top_p: req.top_p.unwrap_or(self.defaults.top_p),
            stop: req.stop.clone().unwrap_or_else(|| self.defaults.stop.clone()),
        }
    }

    /// Builds the wire payload for the given request without sending it.
    /// Split out so conformance tests can assert the temperature field per
    /// variant.
    pub fn build_payload(&self, req: &GenerateRequest) -> (String, Value) {
        let params = self.resolve_params(req);
        match self.kind {
            ProviderKind::Ollama => (
                format!("{}/api/generate", self.base_url),
                ollama::generate_payload(&req.prompt, &params),
            ),
            ProviderKind::OpenAi => (
                format!("{}/chat/completions", self.base_url),
                openai::generate_payload(&req.prompt, &params),
            ),
            ProviderKind::Anthropic => (
                format!("{}/v1/messages", self.base_url),
                anthropic::generate_payload(&req.prompt, &params, self.thinking_budget),
            ),
            ProviderKind::LlamaCpp => (
                format!("{}/completion", self.base_url),
                llamacpp::generate_payload(&req.prompt, &params),
            ),
        }
    }

    fn auth_headers(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, EngineError> {
        match self.kind {
            ProviderKind::OpenAi => {
                let key = self.api_key.as_ref().ok_or_else(|| {
                    EngineError::Validation("openai api key secret not configured".into())
                })?;
                Ok(builder.bearer_auth(key))
            }
            ProviderKind::Anthropic => {
                let key = self.api_key.as_ref().ok_or_else(|| {
                    EngineError::Validation("anthropic api key secret not configured".into())
                })?;
                Ok(builder
                    .header("x-api-key", key)
                    .header("anthropic-version", "2023-06-01"))
            }
            _ => Ok(builder),
        }
    }

    async fn post_json(&self, url: &str, payload: &Value) -> Result<Value, EngineError> {
        let builder = self.http.post(url).json(payload);
        let builder = self.auth_headers(builder)?;
        let response = builder
            .send()
            .await
            .map_err(|e| EngineError::Transport(format!("{}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::upstream_status(status.as_u16(), detail));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::UpstreamSchema(format!("invalid response body: {}", e)))
    }

    fn parse_answer(&self, body: &Value) -> Result<String, EngineError> {
        match self.kind {
            ProviderKind::Ollama => ollama::parse_generate(body),
            ProviderKind::OpenAi => openai::parse_generate(body),
            ProviderKind::Anthropic => anthropic::parse_generate(body),
            ProviderKind::LlamaCpp => llamacpp::parse_generate(body),
        }
    }
}

#[async_trait]
impl Generator for ProviderGateway {
    async fn generate(&self, req: &GenerateRequest) -> Result<String, EngineError> {
        let params = self.resolve_params(req);
        let (url, payload) = self.build_payload(req);
        let span = observe::llm_span(self.kind.name(), &params.model, params.temperature, &req.prompt);

        let answer = async {
            debug!(url = %url, model = %params.model, "llm generate");
            let body = self.post_json(&url, &payload).await?;
            self.parse_answer(&body)
        }
        .instrument(span.clone())
        .await?;

        if answer.is_empty() {
            warn!(provider = self.kind.name(), model = %params.model, "llm returned an empty completion");
        }
        observe::record_completion(&span, &answer);
        Ok(answer)
    }
}

#[async_trait]
impl ToolChat for ProviderGateway {
    async fn chat_step(
        &self,
        messages: &[AgentMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatOutcome, EngineError> {
        match self.kind {
            ProviderKind::Ollama => {
                let url = format!("{}/api/chat", self.base_url);
                let payload = ollama::chat_payload(&self.model, messages, tools);
                let body = self.post_json(&url, &payload).await?;
                ollama::parse_chat(&body)
            }
            ProviderKind::Anthropic => {
                let url = format!("{}/v1/messages", self.base_url);
                let payload =
                    anthropic::chat_payload(&self.model, self.defaults.max_tokens, messages, tools);
                let body = self.post_json(&url, &payload).await?;
                anthropic::parse_chat(&body)
            }
            other => Err(EngineError::Validation(format!(
                "unsupported agent backend: {}",
                other.name()
            ))),
        }
    }
}
