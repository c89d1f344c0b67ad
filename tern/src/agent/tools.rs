//! Agent tool schema and argument validation.
//!
//! The schema is fixed: filesystem listing/reading, code navigation, and
//! memory tools. Validation is strict and returns structured
//! `{error, suggestion}` payloads rather than raising, so the agent can
//! self-correct.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

/// Maximum accepted symbol name length.
pub const MAX_SYMBOL_LENGTH: usize = 200;
/// Maximum accepted path length.
pub const MAX_PATH_LENGTH: usize = 500;
/// Result cap for fan-out navigation tools (callers, callees,
/// implementations, references). Requested limits clamp to this.
pub const MAX_NAV_RESULTS: u64 = 200;

/// One tool the LLM may call: name, description, JSON schema for arguments.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

impl ToolSpec {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema,
        }
    }

    /// OpenAI/ollama wire shape: `{type: "function", function: {...}}`.
    pub fn to_wire_function(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }

    /// Anthropic wire shape: flat `{name, description, input_schema}`.
    pub fn to_wire_anthropic(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.input_schema,
        })
    }
}

fn path_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": {"type": "string", "description": description}
        },
        "required": ["path"]
    })
}

fn symbol_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": {"type": "string", "description": "Fully qualified symbol name"}
        },
        "required": ["symbol"]
    })
}

/// Schema for navigation tools whose result set fans out; they carry a
/// bounded `limit`.
fn symbol_with_limit_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": {"type": "string", "description": "Fully qualified symbol name"},
            "limit": {
                "type": "integer",
                "description": "Max results to return",
                "minimum": 1,
                "maximum": MAX_NAV_RESULTS,
                "default": MAX_NAV_RESULTS
            }
        },
        "required": ["symbol"]
    })
}

fn memory_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": {"type": "string", "description": "Memory record id"}
        },
        "required": ["id"]
    })
}

/// The fixed tool schema handed to the provider on every agent step.
pub fn agent_tool_schema() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "list_files",
            "List files in a directory under the project root.",
            path_schema("Path relative to project root (default: .)"),
        ),
        ToolSpec::new(
            "read_file",
            "Read contents of a file under the project root.",
            path_schema("Path to the file"),
        ),
        ToolSpec::new(
            "get_context",
            "Get surrounding code context for a file location.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path"},
                    "line": {"type": "integer", "description": "1-based line number"}
                },
                "required": ["path"]
            }),
        ),
        ToolSpec::new("find_symbol", "Look up a symbol definition.", symbol_schema()),
        ToolSpec::new("find_callers", "Find callers of a symbol.", symbol_with_limit_schema()),
        ToolSpec::new("find_callees", "Find callees of a symbol.", symbol_with_limit_schema()),
        ToolSpec::new(
            "find_implementations",
            "Find implementations of a trait or interface.",
            symbol_with_limit_schema(),
        ),
        ToolSpec::new(
            "find_references",
            "Find references to a symbol.",
            symbol_with_limit_schema(),
        ),
        ToolSpec::new("get_type_info", "Get type information for a symbol.", symbol_schema()),
        ToolSpec::new(
            "get_imports",
            "List imports of a file.",
            path_schema("File path relative to project root"),
        ),
        ToolSpec::new(
            "get_dependency_tree",
            "Get the dependency tree of a module.",
            symbol_schema(),
        ),
        ToolSpec::new(
            "search_library_docs",
            "Search documentation of project libraries.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"}
                },
                "required": ["query"]
            }),
        ),
        ToolSpec::new(
            "retrieve_memory",
            "Retrieve stored memories relevant to a query.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "What to recall"}
                },
                "required": ["query"]
            }),
        ),
        ToolSpec::new(
            "store_memory",
            "Store a new memory record.",
            json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string", "description": "Memory content"}
                },
                "required": ["content"]
            }),
        ),
        ToolSpec::new("validate_memory", "Mark a memory as validated.", memory_id_schema()),
        ToolSpec::new("contradict_memory", "Mark a memory as contradicted.", memory_id_schema()),
    ]
}

static SYMBOL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_./]*$").expect("valid regex"));

/// Structured validation/error payload handed back to the agent.
pub fn error_payload(error: impl Into<String>, suggestion: impl Into<String>) -> Value {
    json!({"error": error.into(), "suggestion": suggestion.into()})
}

/// Validates a symbol name: identifier characters plus `.` and `/`, bounded
/// length.
pub fn validate_symbol(symbol: &str) -> Result<(), Value> {
    if symbol.len() > MAX_SYMBOL_LENGTH {
        return Err(error_payload(
            format!("symbol name exceeds {} characters", MAX_SYMBOL_LENGTH),
            "check parameters",
        ));
    }
    if !SYMBOL_NAME.is_match(symbol) {
        return Err(error_payload(
            format!("invalid symbol name: {}", symbol),
            "symbol names contain identifier characters, dots, and slashes only",
        ));
    }
    Ok(())
}

/// Clamps the `limit` argument of a fan-out navigation call into
/// [1, MAX_NAV_RESULTS], defaulting to the cap when absent or malformed, so
/// the backend is never asked for an unbounded result set.
pub fn with_result_limit(args: &Value) -> Value {
    let requested = args
        .get("limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(MAX_NAV_RESULTS);
    let mut out = match args {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    out.insert("limit".into(), json!(requested.clamp(1, MAX_NAV_RESULTS)));
    Value::Object(out)
}

/// Validates a path argument: bounded length, no parent-directory segments.
/// (Confinement under the project root happens at resolution time.)
pub fn validate_path(path: &str) -> Result<(), Value> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(error_payload(
            format!("path exceeds {} characters", MAX_PATH_LENGTH),
            "check parameters",
        ));
    }
    if path.split(['/', '\\']).any(|seg| seg == "..") {
        return Err(error_payload(
            "path traversal is not allowed",
            "use paths relative to the project root",
        ));
    }
    Ok(())
}
