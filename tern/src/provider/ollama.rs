//! Ollama-style backend: `/api/generate` for text, `/api/chat` for tools.

use serde_json::{json, Value};

use crate::agent::{AgentMessage, ToolSpec};
use crate::error::EngineError;

use super::{ChatOutcome, NormalizedToolCall, ResolvedParams};

pub(super) fn generate_payload(prompt: &str, params: &ResolvedParams) -> Value {
    json!({
        "model": params.model,
        "prompt": prompt,
        "stream": false,
        "options": {
            "temperature": params.temperature,
            "num_predict": params.max_tokens,
            "top_k": params.top_k,
            "top_p": params.top_p,
            "stop": params.stop,
        }
    })
}

pub(super) fn parse_generate(body: &Value) -> Result<String, EngineError> {
    body.get("response")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| EngineError::UpstreamSchema("missing 'response' field".into()))
}

pub(super) fn chat_payload(model: &str, messages: &[AgentMessage], tools: &[ToolSpec]) -> Value {
    let wire_messages: Vec<Value> = messages
        .iter()
        .map(|m| {
            json!({
                "role": m.role,
                "content": m.content.clone().unwrap_or_default(),
            })
        })
        .collect();
    json!({
        "model": model,
        "messages": wire_messages,
        "tools": tools.iter().map(ToolSpec::to_wire_function).collect::<Vec<_>>(),
        "stream": false,
    })
}

/// Ollama does not assign tool-call ids; a placeholder keeps the normalized
/// shape uniform with providers that do.
pub(super) fn parse_chat(body: &Value) -> Result<ChatOutcome, EngineError> {
    let msg = body
        .get("message")
        .ok_or_else(|| EngineError::UpstreamSchema("missing 'message' field".into()))?;
    let content = msg
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let tool_calls = msg
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|calls| {
            calls
                .iter()
                .filter_map(|tc| {
                    let function = tc.get("function")?;
                    Some(NormalizedToolCall {
                        id: "call_null".to_string(),
                        name: function.get("name")?.as_str()?.to_string(),
                        args: function.get("arguments").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(ChatOutcome {
        content,
        tool_calls,
        raw: Some(msg.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ResolvedParams {
        ResolvedParams {
            model: "llama3".into(),
            temperature: 0.4,
            max_tokens: 256,
            top_k: 40,
            top_p: 0.9,
            stop: vec!["\n".into()],
        }
    }

    /// **Scenario**: Generate payload nests sampling params under "options"
    /// and disables streaming.
    #[test]
    fn generate_payload_shape() {
        let p = generate_payload("why?", &params());
        assert_eq!(p["model"], "llama3");
        assert_eq!(p["stream"], false);
        assert_eq!(p["options"]["temperature"], json!(0.4f32));
        assert_eq!(p["options"]["num_predict"], json!(256));
    }

    /// **Scenario**: Response text is read from "response" and trimmed.
    #[test]
    fn parse_generate_trims() {
        let body = json!({"response": "  the answer \n"});
        assert_eq!(parse_generate(&body).unwrap(), "the answer");
    }

    /// **Scenario**: A body without "response" is a schema error.
    #[test]
    fn parse_generate_missing_field() {
        assert!(matches!(
            parse_generate(&json!({"done": true})),
            Err(EngineError::UpstreamSchema(_))
        ));
    }

    /// **Scenario**: Chat tool calls are normalized with a placeholder id.
    #[test]
    fn parse_chat_normalizes_tool_calls() {
        let body = json!({
            "message": {
                "content": "",
                "tool_calls": [
                    {"function": {"name": "read_file", "arguments": {"path": "src/main.rs"}}}
                ]
            }
        });
        let outcome = parse_chat(&body).unwrap();
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].id, "call_null");
        assert_eq!(outcome.tool_calls[0].name, "read_file");
        assert_eq!(outcome.tool_calls[0].args["path"], "src/main.rs");
    }

    /// **Scenario**: Chat without tool calls yields content only.
    #[test]
    fn parse_chat_content_only() {
        let body = json!({"message": {"content": "done"}});
        let outcome = parse_chat(&body).unwrap();
        assert_eq!(outcome.content, "done");
        assert!(outcome.tool_calls.is_empty());
    }
}
