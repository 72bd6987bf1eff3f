//! Session store.
//!
//! # Overview
//!
//! The store owns the canonical collection of conversation sessions. Every
//! mutation reads the whole collection from the backend, changes it in
//! memory, writes the whole collection back as one value, and then publishes
//! the new state on its [`ChangeBus`].
//!
//! # Failure Policy
//!
//! Storage problems never reach the caller:
//!
//! - a corrupt payload is logged and treated as an empty collection
//! - a read failure makes `list`/`get` return nothing, and makes `save` or
//!   `delete` a no-op so the stored collection is never replaced by a partial
//!   one
//! - a write failure is logged, the backend keeps its previous value and no
//!   notification is sent
//!
//! The UI stays usable even when storage is not.

use std::sync::Arc;

use crate::change_bus::{ChangeBus, Subscription};

use super::backend::{BackendError, PersistenceBackend};
use super::types::Session;

/// Backend key holding the serialized session collection.
pub const SESSIONS_KEY: &str = "inferra-chat-sessions";

/// Notification sent after every successful store mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    /// The backend key that changed.
    pub key: String,

    /// The new collection, or `None` after a clear.
    pub sessions: Option<Vec<Session>>,
}

/// Persistent collection of chat sessions with change notification.
///
/// Cloning a store is cheap and the clones share the backend and the
/// subscriber list.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn PersistenceBackend>,
    key: String,
    bus: ChangeBus<StoreChange>,
}

impl SessionStore {
    /// Create a store on `backend` using the default key.
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self::with_key(backend, SESSIONS_KEY)
    }

    /// Create a store on `backend` under a custom key.
    pub fn with_key(backend: Arc<dyn PersistenceBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            bus: ChangeBus::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Insert or replace a session by id.
    ///
    /// A new id is appended to the end of the collection; an existing id keeps
    /// its position.
    pub fn save(&self, session: &Session) {
        let mut sessions = match self.load() {
            Ok(sessions) => sessions,
            Err(e) => {
                log::error!("Failed to save chat session {}: {}", session.id, e);
                return;
            }
        };

        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => sessions.push(session.clone()),
        }

        if self.write(&sessions, "save") {
            log::debug!("Saved session {} ({} total)", session.id, sessions.len());
            self.notify(Some(sessions));
        }
    }

    /// Load all sessions in stored order.
    ///
    /// Returns an empty collection if nothing is stored or the stored value
    /// can't be read.
    pub fn list(&self) -> Vec<Session> {
        self.load().unwrap_or_else(|e| {
            log::error!("Failed to load chat sessions: {}", e);
            Vec::new()
        })
    }

    /// Find a session by id.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.list().into_iter().find(|s| s.id == id)
    }

    /// Remove the session with `id`. Other sessions are untouched.
    pub fn delete(&self, id: &str) {
        let sessions: Vec<Session> = match self.load() {
            Ok(sessions) => sessions.into_iter().filter(|s| s.id != id).collect(),
            Err(e) => {
                log::error!("Failed to delete chat session {}: {}", id, e);
                return;
            }
        };

        if self.write(&sessions, "delete") {
            log::debug!("Deleted session {}", id);
            self.notify(Some(sessions));
        }
    }

    /// Remove every session.
    pub fn clear(&self) {
        match self.backend.remove(&self.key) {
            Ok(()) => {
                log::debug!("Cleared all sessions");
                self.notify(None);
            }
            Err(e) => log::error!("Failed to clear all sessions: {}", e),
        }
    }

    /// Register a handler called after each successful mutation.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        self.bus.subscribe(handler)
    }

    /// Get the current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    /// Read the collection. A backend failure is an error; a corrupt payload
    /// reads as empty so the next write replaces it.
    fn load(&self) -> Result<Vec<Session>, BackendError> {
        let Some(stored) = self.backend.get(&self.key)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&stored) {
            Ok(sessions) => Ok(sessions),
            Err(e) => {
                log::error!("Failed to parse chat sessions, treating as empty: {}", e);
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, sessions: &[Session], operation: &str) -> bool {
        let json = match serde_json::to_string(sessions) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to {} chat session: {}", operation, e);
                return false;
            }
        };

        match self.backend.set(&self.key, &json) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to {} chat session: {}", operation, e);
                false
            }
        }
    }

    fn notify(&self, sessions: Option<Vec<Session>>) {
        self.bus.publish(&StoreChange {
            key: self.key.clone(),
            sessions,
        });
    }
}

// ============================================================================
// TESTS
// ============================================================================
