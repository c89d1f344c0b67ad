//! llama.cpp-style completion backend (`/completion`).

use serde_json::{json, Value};

use crate::error::EngineError;

use super::ResolvedParams;

pub(super) fn generate_payload(prompt: &str, params: &ResolvedParams) -> Value {
    json!({
        "prompt": prompt,
        "n_predict": params.max_tokens,
        "temperature": params.temperature,
        "top_k": params.top_k,
        "top_p": params.top_p,
        "stop": params.stop,
    })
}

pub(super) fn parse_generate(body: &Value) -> Result<String, EngineError> {
    body.get("content")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| EngineError::UpstreamSchema("missing 'content' field".into()))
}
