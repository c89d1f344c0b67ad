//! Stateless agent step: one turn of a tool-calling loop.
//!
//! The request carries the full normalized message history plus the original
//! query; the response is either an answer or a single tool-call instruction.
//! Tool execution is split between confined local filesystem tools and the
//! circuit-broken navigation/memory backends.

mod backend;
mod fs;
mod tools;

pub use backend::{CircuitBreaker, NavClient, BREAKER_OPEN_FOR, BREAKER_THRESHOLD};
pub use fs::FileTools;
pub use tools::{
    agent_tool_schema, error_payload, validate_path, validate_symbol, with_result_limit,
    ToolSpec, MAX_NAV_RESULTS, MAX_PATH_LENGTH, MAX_SYMBOL_LENGTH,
};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::provider::ToolChat;

/// Function name and raw JSON-encoded arguments of one tool call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolFunction {
    pub name: String,
    pub arguments: String,
}

/// One tool call as carried in message history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_kind")]
    pub kind: String,
    pub function: ToolFunction,
}

fn default_call_kind() -> String {
    "function".to_string()
}

/// One turn of normalized history shared across providers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<AgentToolCall>,
}

impl AgentMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }
}

/// Input of one agent step.
#[derive(Clone, Debug, Deserialize)]
pub struct AgentStepRequest {
    pub query: String,
    #[serde(default)]
    pub history: Vec<AgentMessage>,
}

/// Output of one agent step: answer, or the first tool call to execute next.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStepResponse {
    Answer { content: String },
    ToolCall {
        tool: String,
        args: Value,
        tool_id: String,
    },
}

/// Stateless agent step over a provider-agnostic chat seam.
pub struct AgentStep {
    chat: Arc<dyn ToolChat>,
    tools: Vec<ToolSpec>,
}

impl AgentStep {
    pub fn new(chat: Arc<dyn ToolChat>) -> Self {
        Self {
            chat,
            tools: agent_tool_schema(),
        }
    }

    /// Executes one step: history in, instruction out. LLM failures never
    /// surface as transport errors; the agent gets a terminal answer it can
    /// show.
    pub async fn run_step(&self, request: &AgentStepRequest) -> AgentStepResponse {
        let mut messages = request.history.clone();
        if messages.is_empty() {
            messages.push(AgentMessage::user(format!(
                "Trace the codebase to answer: {}",
                request.query
            )));
        }

        let outcome = match self.chat.chat_step(&messages, &self.tools).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "agent llm call failed");
                return AgentStepResponse::Answer {
                    content: format!("Critical Agent Error: {}", e),
                };
            }
        };

        match outcome.tool_calls.into_iter().next() {
            Some(call) => {
                // Backends may deliver arguments as a JSON-encoded string;
                // parse best-effort, keep the string otherwise.
                let args = match call.args {
                    Value::String(raw) => serde_json::from_str::<Value>(&raw)
                        .unwrap_or(Value::String(raw)),
                    other => other,
                };
                debug!(tool = %call.name, "agent step chose tool call");
                AgentStepResponse::ToolCall {
                    tool: call.name,
                    args,
                    tool_id: call.id,
                }
            }
            None => AgentStepResponse::Answer {
                content: outcome.content,
            },
        }
    }
}

/// Executes tool calls on behalf of the agent: filesystem tools locally under
/// a fixed root, navigation and memory tools via the backend client. Never
/// errors; failures are `{error, suggestion}` payloads.
pub struct ToolExecutor {
    files: FileTools,
    nav: NavClient,
}

impl ToolExecutor {
    pub fn new(files: FileTools, nav: NavClient) -> Self {
        Self { files, nav }
    }

    fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
        args.get(key).and_then(|v| v.as_str())
    }

    pub async fn execute(&self, tool: &str, args: &Value) -> Value {
        match tool {
            "list_files" => {
                let path = Self::str_arg(args, "path").unwrap_or(".");
                self.files.list_files(path)
            }
            "read_file" => {
                let Some(path) = Self::str_arg(args, "path") else {
                    return error_payload("missing path argument", "check parameters");
                };
                self.files.read_file(path)
            }
            "get_context" => {
                if let Some(path) = Self::str_arg(args, "path") {
                    if let Err(e) = validate_path(path) {
                        return e;
                    }
                }
                self.nav.call("context", args).await
            }
            "find_symbol" => match Self::str_arg(args, "symbol") {
                Some(symbol) => {
                    if let Err(e) = validate_symbol(symbol) {
                        return e;
                    }
                    self.nav.call(&format!("symbol/{}", symbol), args).await
                }
                None => error_payload("missing symbol argument", "check parameters"),
            },
            // Fan-out lookups: the result limit is clamped before the call
            // so the backend is never asked for an unbounded set.
            "find_callers" | "find_callees" | "find_implementations" | "find_references" => {
                let Some(symbol) = Self::str_arg(args, "symbol") else {
                    return error_payload("missing symbol argument", "check parameters");
                };
                if let Err(e) = validate_symbol(symbol) {
                    return e;
                }
                let endpoint = match tool {
                    "find_callers" => "callers",
                    "find_callees" => "callees",
                    "find_implementations" => "implementations",
                    _ => "references",
                };
                self.nav.call(endpoint, &with_result_limit(args)).await
            }
            "get_type_info" | "get_dependency_tree" => {
                let Some(symbol) = Self::str_arg(args, "symbol") else {
                    return error_payload("missing symbol argument", "check parameters");
                };
                if let Err(e) = validate_symbol(symbol) {
                    return e;
                }
                let endpoint = if tool == "get_type_info" { "type_info" } else { "dependency_tree" };
                self.nav.call(endpoint, args).await
            }
            "get_imports" => {
                let Some(path) = Self::str_arg(args, "path") else {
                    return error_payload("missing path argument", "check parameters");
                };
                if let Err(e) = validate_path(path) {
                    return e;
                }
                self.nav.call("imports", args).await
            }
            "search_library_docs" => self.nav.call("library_docs", args).await,
            "retrieve_memory" => self.nav.call("memories/retrieve", args).await,
            "store_memory" => self.nav.call("memories", args).await,
            "validate_memory" | "contradict_memory" => {
                let Some(id) = Self::str_arg(args, "id") else {
                    return error_payload("missing id argument", "check parameters");
                };
                let action = if tool == "validate_memory" { "validate" } else { "contradict" };
                self.nav.call(&format!("memories/{}/{}", id, action), args).await
            }
            unknown => error_payload(
                format!("unknown tool: {}", unknown),
                "use one of the tools in the schema",
            ),
        }
    }
}
