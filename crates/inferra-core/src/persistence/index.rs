//! Sorted session list for the history sidebar.
//!
//! # Design
//!
//! The index never reads storage on its own schedule. It loads once when
//! attached and then recomputes from the collection carried by each store
//! notification, so the sidebar always matches the latest mutation.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::change_bus::{ChangeBus, Subscription};

use super::store::{SessionStore, StoreChange};
use super::types::Session;

/// Preview shown for a session with no messages.
pub const EMPTY_PREVIEW: &str = "No messages yet";

/// Display-ready metadata for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    /// Content of the first message, or [`EMPTY_PREVIEW`].
    pub preview: String,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
    pub pdf_filename: Option<String>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            preview: session
                .messages
                .first()
                .map(|m| m.content.clone())
                .unwrap_or_else(|| EMPTY_PREVIEW.to_string()),
            message_count: session.messages.len(),
            updated_at: session.updated_at,
            pdf_filename: session.pdf_filename.clone(),
        }
    }
}

/// Summaries sorted by `updated_at`, most recent first.
///
/// Sessions with equal timestamps keep their order from `sessions`.
pub fn sort_by_recency(sessions: &[Session]) -> Vec<SessionSummary> {
    let mut summaries: Vec<SessionSummary> = sessions.iter().map(SessionSummary::from).collect();
    // sort_by is stable
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    summaries
}

/// Live, sorted view of a [`SessionStore`].
///
/// Dropping the index stops it from tracking the store.
pub struct SessionIndex {
    entries: Arc<Mutex<Vec<SessionSummary>>>,
    changes: ChangeBus<Vec<SessionSummary>>,
    _subscription: Subscription,
}

impl SessionIndex {
    /// Load the current sessions and follow all future store changes.
    pub fn attach(store: &SessionStore) -> Self {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let changes = ChangeBus::new();

        // Subscribe and load under the entries lock, so a save racing with
        // the initial read is applied after it rather than overwritten.
        let subscription = {
            let mut initial = lock(&entries);
            let tracked = Arc::clone(&entries);
            let bus = changes.clone();
            let subscription = store.subscribe(move |change: &StoreChange| {
                let sessions = change.sessions.as_deref().unwrap_or(&[]);
                refresh(&tracked, &bus, sessions);
            });
            *initial = sort_by_recency(&store.list());
            subscription
        };

        Self {
            entries,
            changes,
            _subscription: subscription,
        }
    }

    /// The current sorted view.
    pub fn entries(&self) -> Vec<SessionSummary> {
        lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `handler` with the new view after every recomputation, until the
    /// returned subscription is dropped.
    pub fn on_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&[SessionSummary]) + Send + Sync + 'static,
    {
        self.changes
            .subscribe(move |entries: &Vec<SessionSummary>| handler(entries))
    }
}

fn lock(entries: &Mutex<Vec<SessionSummary>>) -> MutexGuard<'_, Vec<SessionSummary>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

fn refresh(
    entries: &Mutex<Vec<SessionSummary>>,
    changes: &ChangeBus<Vec<SessionSummary>>,
    sessions: &[Session],
) {
    let sorted = sort_by_recency(sessions);
    *lock(entries) = sorted.clone();
    changes.publish(&sorted);
}

// ============================================================================
// TESTS
// ============================================================================
