//! # Session Store
//!
//! In-memory sessions keyed by application name, user id and session id.
//!
//! A session holds the initial key/value state it was created with (for
//! example a display name and a free-text preference blob) and the history of
//! turns committed by completed exchanges. Nothing here is persisted; a
//! session lives as long as the process.

use crate::error::{self, Error, Result};
use crate::turn::ConversationTurn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Arbitrary key/value state attached to a session
pub type SessionState = serde_json::Map<String, serde_json::Value>;

/// The identifiers a dispatch call needs to address its session.
///
/// Passed explicitly into every exchange rather than held as process state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionContext {
    pub user_id: String,
    pub session_id: String,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// First eight characters of the session id, for display
    pub fn short_id(&self) -> &str {
        match self.session_id.char_indices().nth(8) {
            Some((idx, _)) => &self.session_id[..idx],
            None => &self.session_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub app_name: String,
    pub user_id: String,
    pub id: String,
    pub state: SessionState,
    /// Turns committed by completed exchanges (oldest first)
    pub history: Vec<ConversationTurn>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Session {
    pub fn context(&self) -> SessionContext {
        SessionContext::new(&self.user_id, &self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    app_name: String,
    user_id: String,
    session_id: String,
}

impl SessionKey {
    fn new(app_name: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

/// Thread-safe in-memory session storage
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with the given initial state.
    ///
    /// A fresh UUID is used when `session_id` is `None`.
    pub fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        state: SessionState,
    ) -> Result<Session> {
        let id = match session_id {
            Some(id) if id.trim().is_empty() => {
                return Err(Error::invalid_argument("session id must not be empty")
                    .with_operation("session::create"));
            }
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| error::lock_poisoned("session store"))?;

        let key = SessionKey::new(app_name, user_id, &id);
        if sessions.contains_key(&key) {
            return Err(Error::session_exists(id).with_operation("session::create"));
        }

        let now = current_timestamp();
        let session = Session {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            id,
            state,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        sessions.insert(key, session.clone());

        tracing::debug!(app = app_name, user_id, session_id = %session.id, "session created");
        Ok(session)
    }

    /// Get a snapshot of a session
    pub fn get_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Result<Session> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| error::lock_poisoned("session store"))?;

        sessions
            .get(&SessionKey::new(app_name, user_id, session_id))
            .cloned()
            .ok_or_else(|| {
                Error::session_not_found(session_id)
                    .with_operation("session::get")
                    .with_context("app", app_name)
                    .with_context("user_id", user_id)
            })
    }

    /// Append turns to a session's history
    pub fn append_turns(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        turns: impl IntoIterator<Item = ConversationTurn>,
    ) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| error::lock_poisoned("session store"))?;

        let session = sessions
            .get_mut(&SessionKey::new(app_name, user_id, session_id))
            .ok_or_else(|| Error::session_not_found(session_id).with_operation("session::append"))?;

        session.history.extend(turns);
        session.updated_at = current_timestamp();
        Ok(())
    }

    /// List session ids for one user of one application, sorted
    pub fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<String>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| error::lock_poisoned("session store"))?;

        let mut ids: Vec<String> = sessions
            .keys()
            .filter(|key| key.app_name == app_name && key.user_id == user_id)
            .map(|key| key.session_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| error::lock_poisoned("session store"))?;

        sessions
            .remove(&SessionKey::new(app_name, user_id, session_id))
            .map(|_| ())
            .ok_or_else(|| Error::session_not_found(session_id).with_operation("session::delete"))
    }
}

fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
