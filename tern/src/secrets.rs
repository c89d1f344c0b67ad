//! Secret loading from a mounted directory.
//!
//! Provider credentials are read from files under a mount path (one file per
//! secret, e.g. `/run/secrets/openai_api_key`), never from the environment.
//! A missing secret file is a warning, not an error: the backend that needs
//! it will fail at call time with a clear validation message.

use std::path::{Path, PathBuf};

use tracing::{error, warn};

/// Default mount directory for secrets.
pub const DEFAULT_SECRETS_DIR: &str = "/run/secrets";

/// Reads named secrets from files under a mount directory.
#[derive(Clone, Debug)]
pub struct SecretStore {
    dir: PathBuf,
}

impl SecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the default mount path.
    pub fn mounted() -> Self {
        Self::new(DEFAULT_SECRETS_DIR)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reads and trims the secret with the given name. Returns `None` when
    /// the file is missing or unreadable (logged, never fatal).
    pub fn read(&self, name: &str) -> Option<String> {
        let path = self.dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let value = raw.trim().to_string();
                if value.is_empty() {
                    warn!(secret = name, "secret file is empty");
                    None
                } else {
                    Some(value)
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(secret = name, path = %path.display(), "secret file not found");
                None
            }
            Err(e) => {
                error!(secret = name, error = %e, "failed to read secret");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: A present secret file is read and trimmed.
    #[test]
    fn read_trims_value() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("api_key"), "  sk-secret-value\n").unwrap();
        let store = SecretStore::new(dir.path());
        assert_eq!(store.read("api_key").as_deref(), Some("sk-secret-value"));
    }

    /// **Scenario**: A missing secret file yields None instead of an error.
    #[test]
    fn read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::new(dir.path());
        assert_eq!(store.read("nope"), None);
    }

    /// **Scenario**: An empty secret file yields None.
    #[test]
    fn read_empty_is_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blank"), "   \n").unwrap();
        let store = SecretStore::new(dir.path());
        assert_eq!(store.read("blank"), None);
    }
}
