//! Thread-safe session management with TTL expiry.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A keyed conversation context with its own history and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier
    pub session_id: String,
    /// Optional owning user
    pub user_id: Option<String>,
    /// Conversation the session wraps
    pub conversation_id: String,
    /// Last time the session was touched
    pub last_updated: DateTime<Utc>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Bounded history of conversation entries, oldest trimmed
    #[serde(default)]
    pub conversation_history: Vec<Value>,
    /// History bound
    pub max_history_size: usize,
}

impl Session {
    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    fn push_history(&mut self, entry: Value) {
        self.conversation_history.push(entry);
        if self.conversation_history.len() > self.max_history_size {
            let excess = self.conversation_history.len() - self.max_history_size;
            self.conversation_history.drain(..excess);
        }
    }
}

/// Thread-safe map of session id to session, with lazy and eager expiry.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    timeout: Duration,
    max_history_size: usize,
}

impl SessionManager {
    /// Create a manager with the given idle timeout and history bound.
    pub fn new(timeout: Duration, max_history_size: usize) -> Self {
        SessionManager {
            sessions: Mutex::new(HashMap::new()),
            timeout,
            max_history_size,
        }
    }

    fn is_expired(&self, session: &Session) -> bool {
        let idle = Utc::now().signed_duration_since(session.last_updated);
        idle.to_std().map(|d| d > self.timeout).unwrap_or(false)
    }

    /// Create a new session. Fails when the id already exists.
    pub fn create(
        &self,
        session_id: &str,
        user_id: Option<String>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Session> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(session_id) {
            return Err(Error::InvalidInput(format!(
                "Session '{}' already exists",
                session_id
            )));
        }

        let session = Session {
            session_id: session_id.to_string(),
            user_id,
            conversation_id: Uuid::new_v4().to_string(),
            last_updated: Utc::now(),
            metadata: metadata.unwrap_or_default(),
            conversation_history: Vec::new(),
            max_history_size: self.max_history_size,
        };
        sessions.insert(session_id.to_string(), session.clone());
        info!("Created session {}", session_id);
        Ok(session)
    }

    /// Fetch a session. Expiry is checked lazily: an expired session is
    /// dropped and reported as [`Error::SessionExpired`] when
    /// `raise_if_expired` is set, as [`Error::SessionNotFound`] otherwise.
    pub fn get(&self, session_id: &str, raise_if_expired: bool) -> Result<Session> {
        let mut sessions = self.sessions.lock();
        match sessions.get(session_id) {
            None => Err(Error::SessionNotFound(session_id.to_string())),
            Some(session) if self.is_expired(session) => {
                sessions.remove(session_id);
                debug!("Session {} expired on access", session_id);
                if raise_if_expired {
                    Err(Error::SessionExpired(session_id.to_string()))
                } else {
                    Err(Error::SessionNotFound(session_id.to_string()))
                }
            }
            Some(session) => Ok(session.clone()),
        }
    }

    /// Merge metadata into a session and refresh its timestamp.
    pub fn update(&self, session_id: &str, metadata: Map<String, Value>) -> Result<()> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        session.metadata.extend(metadata);
        session.touch();
        Ok(())
    }

    /// Append a history entry, trimming the oldest past the bound.
    pub fn add_to_history(&self, session_id: &str, entry: Value) -> Result<()> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        session.push_history(entry);
        session.touch();
        Ok(())
    }

    /// Remove a session entirely.
    pub fn clear(&self, session_id: &str) -> Result<()> {
        if self.sessions.lock().remove(session_id).is_none() {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }
        info!("Cleared session {}", session_id);
        Ok(())
    }

    /// Drop every expired session eagerly. Returns the count removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| self.is_expired(s))
            .map(|s| s.session_id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            debug!("Removed {} expired sessions", expired.len());
        }
        expired.len()
    }

    /// Serialise a session to JSON.
    pub fn export(&self, session_id: &str) -> Result<String> {
        let session = self.get(session_id, false)?;
        Ok(serde_json::to_string_pretty(&session)?)
    }

    /// Import a session from JSON, replacing any existing one with the same
    /// id. Returns the session id.
    pub fn import(&self, raw: &str) -> Result<String> {
        let session: Session = serde_json::from_str(raw)?;
        let id = session.session_id.clone();
        self.sessions.lock().insert(id.clone(), session);
        Ok(id)
    }

    /// Number of live (not yet reaped) sessions.
    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> SessionManager {
        SessionManager::new(Duration::from_secs(3600), 100)
    }

    #[test]
    fn create_and_get() {
        let mgr = manager();
        mgr.create("s1", Some("user".into()), None).unwrap();

        let session = mgr.get("s1", false).unwrap();
        assert_eq!(session.user_id.as_deref(), Some("user"));
        assert!(matches!(
            mgr.get("nope", false),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let mgr = manager();
        mgr.create("s1", None, None).unwrap();
        assert!(mgr.create("s1", None, None).is_err());
        assert_eq!(mgr.count(), 1);
    }

    #[test]
    fn expired_session_is_dropped_on_access() {
        let mgr = SessionManager::new(Duration::ZERO, 100);
        mgr.create("s1", None, None).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert!(matches!(mgr.get("s1", true), Err(Error::SessionExpired(_))));
        // Removed by the first access.
        assert!(matches!(
            mgr.get("s1", true),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[test]
    fn history_is_capped_with_oldest_trimmed() {
        let mgr = SessionManager::new(Duration::from_secs(3600), 3);
        mgr.create("s1", None, None).unwrap();
        for i in 0..5 {
            mgr.add_to_history("s1", json!({"turn": i})).unwrap();
        }

        let session = mgr.get("s1", false).unwrap();
        assert_eq!(session.conversation_history.len(), 3);
        assert_eq!(session.conversation_history[0]["turn"], 2);
        assert_eq!(session.conversation_history[2]["turn"], 4);
    }

    #[test]
    fn metadata_updates_merge() {
        let mgr = manager();
        mgr.create("s1", None, None).unwrap();

        let mut meta = Map::new();
        meta.insert("locale".into(), json!("en"));
        mgr.update("s1", meta).unwrap();

        assert_eq!(mgr.get("s1", false).unwrap().metadata["locale"], "en");
    }

    #[test]
    fn export_import_round_trips() {
        let mgr = manager();
        mgr.create("s1", Some("user".into()), None).unwrap();
        mgr.add_to_history("s1", json!({"role": "user", "content": "hi"}))
            .unwrap();

        let exported = mgr.export("s1").unwrap();
        mgr.clear("s1").unwrap();

        let id = mgr.import(&exported).unwrap();
        assert_eq!(id, "s1");
        let restored = mgr.get("s1", false).unwrap();
        assert_eq!(restored.conversation_history.len(), 1);
    }

    #[test]
    fn cleanup_expired_reaps_eagerly() {
        let mgr = SessionManager::new(Duration::ZERO, 100);
        mgr.create("s1", None, None).unwrap();
        mgr.create("s2", None, None).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(mgr.cleanup_expired(), 2);
        assert_eq!(mgr.count(), 0);
    }
}
