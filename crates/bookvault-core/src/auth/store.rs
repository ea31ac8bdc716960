use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::session::SessionUser;
use super::token::Credential;

/// Key holding the raw bearer credential.
pub const TOKEN_KEY: &str = "auth_token";

/// Key holding the serialized `SessionUser` snapshot.
pub const USER_KEY: &str = "user_data";

/// Persists the credential and the user snapshot as two entries in a
/// session directory, one file per key.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save both entries. The token is written last so an interrupted save
    /// never leaves a credential without its user.
    pub fn save(&self, credential: &Credential, user: &SessionUser) -> Result<()> {
        std::fs::create_dir_all(&self.dir).context("Failed to create session directory")?;

        let snapshot = serde_json::to_string(user)?;
        std::fs::write(self.entry_path(USER_KEY), snapshot)
            .context("Failed to write session user")?;
        std::fs::write(self.entry_path(TOKEN_KEY), credential.as_str())
            .context("Failed to write session token")?;

        debug!(dir = ?self.dir, "Session saved");
        Ok(())
    }

    /// Load both entries, or `None` if either is missing or unreadable.
    pub fn load(&self) -> Option<(Credential, SessionUser)> {
        let token = self.read_entry(TOKEN_KEY)?;
        let token = token.trim();
        if token.is_empty() {
            warn!("Stored session token is empty");
            return None;
        }

        let snapshot = self.read_entry(USER_KEY)?;
        let user: SessionUser = match serde_json::from_str(&snapshot) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Failed to parse stored session user");
                return None;
            }
        };

        Some((Credential::new(token), user))
    }

    /// Remove both entries. Missing entries are not an error.
    pub fn clear(&self) -> Result<()> {
        for key in [TOKEN_KEY, USER_KEY] {
            match std::fs::remove_file(self.entry_path(key)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove session entry: {}", key))
                }
            }
        }
        Ok(())
    }

    fn read_entry(&self, key: &str) -> Option<String> {
        match std::fs::read_to_string(self.entry_path(key)) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(error = %e, key, "Failed to read session entry");
                None
            }
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}
