//! Parse a `.env` file into a key-value map.
//!
//! Nothing is applied to the process environment here; precedence against
//! existing env and the config file is decided in `lib.rs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn dotenv_path(override_dir: Option<&Path>) -> Option<PathBuf> {
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())?;
    let path = dir.join(".env");
    path.is_file().then_some(path)
}

/// Minimal .env parser: `KEY=VALUE` lines, with an optional `export ` prefix.
/// Empty lines and `#` comment lines are skipped; `#` inside a value is kept.
/// Double-quoted values support `\"` escapes; single-quoted values are
/// stripped verbatim. No multiline values.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        out.insert(key.to_string(), unquote(value.trim()));
    }
    out
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return value[1..value.len() - 1].replace("\\\"", "\"");
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    value.to_string()
}

/// Loads `.env` from `override_dir` or the current directory. A missing file
/// returns an empty map.
pub fn load_env_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    let path = match dotenv_path(override_dir) {
        Some(p) => p,
        None => return Ok(HashMap::new()),
    };
    let content = std::fs::read_to_string(&path)?;
    Ok(parse_dotenv(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Plain assignments, comments, and blank lines.
    #[test]
    fn parse_basics() {
        let m = parse_dotenv("FOO=bar\n\n# a comment\nBAZ=quux\n");
        assert_eq!(m.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(m.get("BAZ"), Some(&"quux".to_string()));
        assert_eq!(m.len(), 2);
    }

    /// **Scenario**: `export KEY=value` lines parse like plain assignments.
    #[test]
    fn export_prefix() {
        let m = parse_dotenv("export LLM_BACKEND=ollama\n");
        assert_eq!(m.get("LLM_BACKEND"), Some(&"ollama".to_string()));
    }

    /// **Scenario**: Double quotes unescape; single quotes strip verbatim.
    #[test]
    fn quoting() {
        let m = parse_dotenv("A=\"say \\\"hi\\\"\"\nB='raw $value'\nC=\"\"\n");
        assert_eq!(m.get("A"), Some(&"say \"hi\"".to_string()));
        assert_eq!(m.get("B"), Some(&"raw $value".to_string()));
        assert_eq!(m.get("C"), Some(&"".to_string()));
    }

    /// **Scenario**: Lines without `=` and empty keys are skipped.
    #[test]
    fn malformed_lines_skipped() {
        let m = parse_dotenv("JUST_A_WORD\n=value_only\nOK=1\n");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("OK"), Some(&"1".to_string()));
    }

    /// **Scenario**: Missing file yields an empty map; a present file is read.
    #[test]
    fn load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_env_map(Some(dir.path())).unwrap().is_empty());

        std::fs::write(dir.path().join(".env"), "A=1\nB=2\n").unwrap();
        let m = load_env_map(Some(dir.path())).unwrap();
        assert_eq!(m.get("A"), Some(&"1".to_string()));
        assert_eq!(m.get("B"), Some(&"2".to_string()));
    }
}
