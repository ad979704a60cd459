//! Single-file session persistence.
//!
//! The snapshot holds the conversation messages, the run mode, and the
//! system prompt. Loading is best-effort: a missing file yields a fresh
//! session and a corrupt file is deleted after a warning.

use crate::agent::{Message, RunMode};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Everything persisted between sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Conversation messages, system prompt first when present
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Mode the session was running in
    #[serde(default)]
    pub mode: RunMode,
    /// System prompt, duplicated for convenience of consumers
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Persists one session snapshot to a JSON file.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Create a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore { path: path.into() }
    }

    /// The file this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. Missing file yields a fresh session; a corrupt
    /// file is deleted and also yields a fresh session.
    pub fn load(&self) -> SessionSnapshot {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("No session file at {}, starting fresh", self.path.display());
                return SessionSnapshot::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    "Corrupt session file {} ({}), deleting and starting fresh",
                    self.path.display(),
                    e
                );
                let _ = std::fs::remove_file(&self.path);
                SessionSnapshot::default()
            }
        }
    }

    /// Write the snapshot, creating parent directories as needed.
    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, raw)?;
        debug!("Saved session to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::Message;

    fn sample() -> SessionSnapshot {
        SessionSnapshot {
            messages: vec![
                Message::system("You are helpful."),
                Message::user("hello"),
                Message::assistant("hi"),
            ],
            mode: RunMode::Plan,
            system_prompt: Some("You are helpful.".into()),
        }
    }

    #[test]
    fn missing_file_yields_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let snapshot = store.load();
        assert!(snapshot.messages.is_empty());
        assert_eq!(snapshot.mode, RunMode::Act);
    }

    #[test]
    fn save_load_save_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));

        store.save(&sample()).unwrap();
        let first = std::fs::read(store.path()).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.messages.len(), 3);
        assert_eq!(loaded.mode, RunMode::Plan);

        store.save(&loaded).unwrap();
        let second = std::fs::read(store.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_file_is_deleted_and_session_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not valid json").unwrap();

        let store = SessionStore::new(&path);
        let snapshot = store.load();
        assert!(snapshot.messages.is_empty());
        assert!(!path.exists());
    }
}
