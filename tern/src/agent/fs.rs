//! Filesystem tools confined to the project root.
//!
//! Every path is validated, lexically normalized, and joined under the
//! configured root; any attempt to escape resolves to an error payload, not
//! an escape.

use std::path::{Component, Path, PathBuf};

use serde_json::{json, Value};

use super::tools::{error_payload, validate_path};

/// Executes `list_files` and `read_file` under a fixed root.
pub struct FileTools {
    root: PathBuf,
}

impl FileTools {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a relative path under the root. Absolute paths, parent
    /// segments, and anything else that would leave the root are rejected.
    fn resolve(&self, raw: &str) -> Result<PathBuf, Value> {
        validate_path(raw)?;
        let candidate = Path::new(raw);
        if candidate.is_absolute() {
            return Err(error_payload(
                "absolute paths are not allowed",
                "use paths relative to the project root",
            ));
        }
        let mut resolved = self.root.clone();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(error_payload(
                        "path traversal is not allowed",
                        "use paths relative to the project root",
                    ))
                }
            }
        }
        if !resolved.starts_with(&self.root) {
            return Err(error_payload(
                "path escapes the project root",
                "use paths relative to the project root",
            ));
        }
        Ok(resolved)
    }

    /// Lists non-hidden entries of a directory. Returns `{files: [...]}` or
    /// an error payload.
    pub fn list_files(&self, raw: &str) -> Value {
        let path = match self.resolve(raw) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if !path.is_dir() {
            return error_payload(
                format!("not a directory: {}", raw),
                "use list_files on directories and read_file on files",
            );
        }
        match std::fs::read_dir(&path) {
            Ok(entries) => {
                let mut files: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .filter(|name| !name.starts_with('.'))
                    .collect();
                files.sort();
                json!({ "files": files })
            }
            Err(e) => error_payload(format!("cannot list directory: {}", e), "check parameters"),
        }
    }

    /// Reads a UTF-8 file. Returns `{content: "..."}` or an error payload.
    pub fn read_file(&self, raw: &str) -> Value {
        let path = match self.resolve(raw) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if !path.exists() {
            return error_payload(format!("file not found: {}", raw), "not found, try find_symbol");
        }
        if path.is_dir() {
            return error_payload(
                format!("is a directory: {}", raw),
                "use list_files on directories",
            );
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => json!({ "content": content }),
            Err(e) => error_payload(format!("cannot read file: {}", e), "check parameters"),
        }
    }
}
