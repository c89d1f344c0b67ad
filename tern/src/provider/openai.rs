//! OpenAI-style chat completions backend (`/chat/completions`).

use serde_json::{json, Value};

use crate::error::EngineError;

use super::ResolvedParams;

pub(super) fn generate_payload(prompt: &str, params: &ResolvedParams) -> Value {
    json!({
        "model": params.model,
        "messages": [{"role": "user", "content": prompt}],
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
        "top_p": params.top_p,
        "stop": params.stop,
    })
}

pub(super) fn parse_generate(body: &Value) -> Result<String, EngineError> {
    body.get("choices")
        .and_then(|v| v.as_array())
        .and_then(|choices| choices.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| EngineError::UpstreamSchema("missing choices[0].message.content".into()))
}
