//! Load the `[env]` table from the service config file.
//!
//! The file is `config.toml` in the working (or override) directory, or the
//! path named by the `CONFIG_FILE` environment variable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::LoadError;

fn config_path(override_dir: Option<&Path>) -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("CONFIG_FILE") {
        let path = PathBuf::from(explicit);
        return path.is_file().then_some(path);
    }
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())?;
    let path = dir.join("config.toml");
    path.is_file().then_some(path)
}

#[derive(serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Returns env key-value pairs from the `[env]` section. A missing file or
/// empty section returns an empty map.
pub fn load_env_map(override_dir: Option<&Path>) -> Result<HashMap<String, String>, LoadError> {
    let path = match config_path(override_dir) {
        Some(p) => p,
        None => return Ok(HashMap::new()),
    };
    let content = std::fs::read_to_string(&path).map_err(LoadError::ConfigRead)?;
    let config: ConfigFile = toml::from_str(&content)?;
    Ok(config.env)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: A missing config file yields an empty map, not an error.
    #[test]
    fn missing_config_returns_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let map = load_env_map(Some(dir.path())).unwrap();
        assert!(map.is_empty());
    }

    /// **Scenario**: The [env] table is read from config.toml in the
    /// override directory.
    #[test]
    fn reads_env_table() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[env]\nFOO = \"from_toml\"\nBAR = \"baz\"\n",
        )
        .unwrap();
        let map = load_env_map(Some(dir.path())).unwrap();
        assert_eq!(map.get("FOO"), Some(&"from_toml".to_string()));
        assert_eq!(map.get("BAR"), Some(&"baz".to_string()));
    }

    /// **Scenario**: An empty [env] section yields an empty map.
    #[test]
    fn empty_env_section() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[env]\n").unwrap();
        let map = load_env_map(Some(dir.path())).unwrap();
        assert!(map.is_empty());
    }

    /// **Scenario**: Invalid TOML surfaces as a parse error.
    #[test]
    fn invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "not [ valid toml").unwrap();
        assert!(matches!(
            load_env_map(Some(dir.path())),
            Err(LoadError::ConfigParse(_))
        ));
    }
}
