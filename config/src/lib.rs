//! Load configuration from a service `config.toml` and project `.env`, then
//! apply to the process environment with priority: **existing env > .env >
//! config.toml**.
//!
//! The serve binary calls [`load_and_apply`] once at startup; everything
//! downstream reads plain environment variables. Secrets are NOT handled
//! here — they come from the secret mount, never from env files.

mod dotenv;
mod toml_file;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read config file: {0}")]
    ConfigRead(std::io::Error),
    #[error("parse config toml: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads config from an optional `config.toml` and optional project `.env`,
/// then sets environment variables only for keys that are **not** already set
/// (so existing env has highest priority).
///
/// Order of precedence when a key is missing in the process environment:
/// 1. Value from project `.env` (in `override_dir` if given, else the current
///    directory)
/// 2. Value from the `[env]` table of the config file (`CONFIG_FILE` env var
///    if set, else `config.toml` next to `.env`)
pub fn load_and_apply(override_dir: Option<&Path>) -> Result<(), LoadError> {
    let toml_map = toml_file::load_env_map(override_dir)?;
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::HashSet<String> = toml_map.keys().cloned().collect();
    keys.extend(dotenv_map.keys().cloned());

    for key in keys {
        if std::env::var(&key).is_ok() {
            continue; // existing env wins
        }
        let value = dotenv_map.get(&key).or_else(|| toml_map.get(&key)).cloned();
        if let Some(v) = value {
            std::env::set_var(&key, v);
        }
    }

    Ok(())
}
