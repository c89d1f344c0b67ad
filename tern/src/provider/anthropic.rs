//! Anthropic messages backend (`/v1/messages`), with optional thinking mode.
//!
//! Thinking mode changes the temperature contract: the API rejects a sampled
//! temperature while thinking, so the payload carries `temperature: null`
//! plus a `thinking` block with the token budget. Without thinking mode the
//! call-site temperature is sent like every other provider.

use serde_json::{json, Value};

use crate::agent::{AgentMessage, ToolSpec};
use crate::error::EngineError;

use super::{ChatOutcome, NormalizedToolCall, ResolvedParams};

const AGENT_SYSTEM_PROMPT: &str = "You are a helpful coding agent.";

pub(super) fn generate_payload(
    prompt: &str,
    params: &ResolvedParams,
    thinking_budget: Option<u32>,
) -> Value {
    let mut payload = json!({
        "model": params.model,
        "max_tokens": params.max_tokens,
        "messages": [{"role": "user", "content": prompt}],
    });
    match thinking_budget {
        Some(budget) => {
            payload["temperature"] = Value::Null;
            payload["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        }
        None => {
            payload["temperature"] = json!(params.temperature);
        }
    }
    payload
}

/// The answer is the concatenation of every text block; thinking blocks are
/// skipped.
pub(super) fn parse_generate(body: &Value) -> Result<String, EngineError> {
    let blocks = body
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| EngineError::UpstreamSchema("missing content array".into()))?;
    let mut text = String::new();
    for block in blocks {
        if block.get("type").and_then(|v| v.as_str()) == Some("text") {
            if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                text.push_str(t);
            }
        }
    }
    Ok(text.trim().to_string())
}

/// Tool-result turns arrive with role "tool" in the shared history format but
/// must be sent as user-role `tool_result` blocks; assistant turns with tool
/// calls become `tool_use` blocks.
pub(super) fn chat_payload(
    model: &str,
    max_tokens: u32,
    messages: &[AgentMessage],
    tools: &[ToolSpec],
) -> Value {
    let mut wire_messages: Vec<Value> = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role.as_str() {
            "tool" => {
                wire_messages.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                        "content": m.content.clone().unwrap_or_default(),
                    }]
                }));
            }
            "assistant" => {
                let mut blocks: Vec<Value> = Vec::new();
                if let Some(content) = &m.content {
                    if !content.is_empty() {
                        blocks.push(json!({"type": "text", "text": content}));
                    }
                }
                for tc in &m.tool_calls {
                    let input = serde_json::from_str::<Value>(&tc.function.arguments)
                        .unwrap_or(Value::Null);
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.function.name,
                        "input": input,
                    }));
                }
                wire_messages.push(json!({"role": "assistant", "content": blocks}));
            }
            // System turns are hoisted to the top-level system field.
            "system" => {}
            _ => {
                if let Some(content) = &m.content {
                    wire_messages.push(json!({"role": "user", "content": content}));
                }
            }
        }
    }
    json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": AGENT_SYSTEM_PROMPT,
        "messages": wire_messages,
        "tools": tools.iter().map(ToolSpec::to_wire_anthropic).collect::<Vec<_>>(),
    })
}

pub(super) fn parse_chat(body: &Value) -> Result<ChatOutcome, EngineError> {
    let blocks = body
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| EngineError::UpstreamSchema("missing content array".into()))?;
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|v| v.as_str()) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                    content.push_str(t);
                }
            }
            Some("tool_use") => {
                tool_calls.push(NormalizedToolCall {
                    id: block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    name: block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    args: block.get("input").cloned().unwrap_or(Value::Null),
                });
            }
            _ => {}
        }
    }
    Ok(ChatOutcome {
        content,
        tool_calls,
        raw: None,
    })
}
