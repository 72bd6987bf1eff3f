//! Active conversation manager.
//!
//! Drives one chat view: which session is open, sending a question and
//! recording the answer, attaching a document. Persistence goes through the
//! [`SessionStore`]; answers come from a [`ConversationApi`].
//!
//! # Send Policy
//!
//! Only one question can be outstanding at a time. A second `send_message`
//! while the first is still waiting for its answer is rejected with
//! [`ChatError::RequestPending`] and changes nothing.
//!
//! # Failure Policy
//!
//! A failed request leaves the user's message in the open session, records
//! the error text for display, and does not touch storage, so the stored
//! history still ends at the last successful exchange.
//!
//! An answer always lands in the session the question was asked in, even if
//! the user opened another chat meanwhile. If that session was deleted (or the
//! history cleared) while waiting, the answer is dropped with
//! [`ChatError::Discarded`] instead of bringing the session back.
//!
//! Dropping a `send_message` future mid-request releases the pending slot.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::api::{ConversationApi, RequestError};
use crate::persistence::store::SessionStore;
use crate::persistence::types::{Message, Session};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Still waiting for the previous answer")]
    RequestPending,

    #[error("Chat not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Failed to get response: {0}")]
    TaskFailed(String),

    #[error("Conversation was deleted before the answer arrived")]
    Discarded,
}

#[derive(Default)]
struct ChatState {
    active: Option<Session>,
    pending: Option<Pending>,
    next_ticket: u64,
    last_error: Option<String>,
    /// Document attached before (or outside) any session; new sessions inherit it.
    document: Option<String>,
}

/// The one outstanding question.
struct Pending {
    ticket: u64,
    session_id: String,
    discarded: bool,
}

/// Frees the pending slot when a send finishes or its future is dropped.
struct PendingGuard<'a> {
    manager: &'a ChatSessionManager,
    ticket: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.manager.state();
        if state.pending.as_ref().is_some_and(|p| p.ticket == self.ticket) {
            state.pending = None;
        }
    }
}

/// Manages the open chat and its round trips to the backend.
pub struct ChatSessionManager {
    store: SessionStore,
    api: Arc<dyn ConversationApi>,
    state: Mutex<ChatState>,
}

impl ChatSessionManager {
    pub fn new(store: SessionStore, api: Arc<dyn ConversationApi>) -> Self {
        Self {
            store,
            api,
            state: Mutex::new(ChatState::default()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a fresh, unsaved session.
    pub fn new_chat(&self) -> Session {
        let mut state = self.state();
        let session = Session::new(state.document.clone());
        state.active = Some(session.clone());
        state.last_error = None;
        log::debug!("Started new chat {}", session.id);
        session
    }

    /// Open a stored session.
    pub fn select_chat(&self, id: &str) -> Result<Session, ChatError> {
        let session = self
            .store
            .get(id)
            .ok_or_else(|| ChatError::NotFound(id.to_string()))?;

        let mut state = self.state();
        state.active = Some(session.clone());
        state.last_error = None;
        Ok(session)
    }

    /// The open session, if any.
    pub fn active(&self) -> Option<Session> {
        self.state().active.clone()
    }

    /// Text of the last request failure, cleared by the next send.
    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.state().pending.is_some()
    }

    /// Record an uploaded document on the open session.
    ///
    /// Sessions that already have messages are saved right away; an empty
    /// session picks the name up when its first exchange is saved.
    pub fn attach_document(&self, filename: impl Into<String>) -> Option<Session> {
        let filename = filename.into();
        let to_save = {
            let mut guard = self.state();
            let state = &mut *guard;
            state.document = Some(filename.clone());
            let session = state.active.as_mut()?;
            session.set_pdf_filename(filename);
            session.clone()
        };

        if !to_save.is_empty() {
            self.store.save(&to_save);
        }
        Some(to_save)
    }

    /// Delete a stored session, closing it if it was open.
    ///
    /// An answer still pending for it is discarded when it arrives.
    pub fn delete_chat(&self, id: &str) {
        self.store.delete(id);
        let mut state = self.state();
        if state.active.as_ref().is_some_and(|s| s.id == id) {
            state.active = None;
        }
        if let Some(pending) = state.pending.as_mut().filter(|p| p.session_id == id) {
            pending.discarded = true;
        }
    }

    /// Delete every stored session and close the open one.
    pub fn clear_history(&self) {
        self.store.clear();
        let mut state = self.state();
        state.active = None;
        if let Some(pending) = state.pending.as_mut() {
            pending.discarded = true;
        }
    }

    /// Ask a question in the open session, creating one if needed.
    ///
    /// Returns the assistant's reply once it has been appended and saved.
    pub async fn send_message(&self, content: &str) -> Result<Message, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let (asked_in, _guard) = {
            let mut guard = self.state();
            let state = &mut *guard;
            if state.pending.is_some() {
                return Err(ChatError::RequestPending);
            }

            let document = state.document.clone();
            let session = state.active.get_or_insert_with(|| Session::new(document));
            session.push_message(Message::user(content));
            let asked_in = session.clone();

            state.next_ticket += 1;
            let ticket = state.next_ticket;
            state.pending = Some(Pending {
                ticket,
                session_id: asked_in.id.clone(),
                discarded: false,
            });
            state.last_error = None;
            (asked_in, PendingGuard { manager: self, ticket })
        };

        let api = Arc::clone(&self.api);
        let question = content.to_string();
        let result = tokio::task::spawn_blocking(move || api.ask_question(&question)).await;

        let outcome = match result {
            Ok(Ok(answer)) => Ok(Message::assistant(answer)),
            Ok(Err(e)) => Err(ChatError::Request(e)),
            Err(e) => Err(ChatError::TaskFailed(e.to_string())),
        };

        let (reply, to_save) = {
            let mut state = self.state();
            let discarded = state.pending.take().is_some_and(|p| p.discarded);

            let reply = match outcome {
                Ok(_) if discarded => {
                    log::info!("Dropping answer for deleted session {}", asked_in.id);
                    return Err(ChatError::Discarded);
                }
                Ok(reply) => reply,
                Err(e) => {
                    log::warn!("Question in {} failed: {}", asked_in.id, e);
                    if !discarded {
                        state.last_error = Some(e.to_string());
                    }
                    return Err(e);
                }
            };

            // The snapshot holds the question; the open copy may have been
            // reloaded from storage without it.
            let mut session = asked_in;
            let same_open = state.active.as_ref().filter(|a| a.id == session.id);
            if let Some(active) = same_open {
                session.pdf_filename = active.pdf_filename.clone();
            }
            session.push_message(reply.clone());
            if let Some(active) = state.active.as_mut().filter(|a| a.id == session.id) {
                *active = session.clone();
            }
            (reply, session)
        };

        self.store.save(&to_save);
        log::info!(
            "Answer received for {} ({} messages)",
            to_save.id,
            to_save.messages.len()
        );
        Ok(reply)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::backend::MemoryBackend;
    use crate::persistence::types::MessageRole;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Answers every question with a fixed reply or error.
    struct StubApi {
        reply: Result<String, RequestError>,
        questions: Mutex<Vec<String>>,
    }

    impl StubApi {
        fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(answer.to_string()),
                questions: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(RequestError::Status {
                    status: 500,
                    message: message.to_string(),
                }),
                questions: Mutex::new(Vec::new()),
            })
        }
    }

    impl ConversationApi for StubApi {
        fn ask_question(&self, question: &str) -> Result<String, RequestError> {
            self.questions.lock().unwrap().push(question.to_string());
            self.reply.clone()
        }
    }

    /// Blocks until the test releases it.
    struct GatedApi {
        gate: Mutex<mpsc::Receiver<String>>,
    }

    impl ConversationApi for GatedApi {
        fn ask_question(&self, _question: &str) -> Result<String, RequestError> {
            self.gate
                .lock()
                .unwrap()
                .recv()
                .map_err(|e| RequestError::Local(e.to_string()))
        }
    }

    fn manager_with(api: Arc<dyn ConversationApi>) -> ChatSessionManager {
        ChatSessionManager::new(SessionStore::new(Arc::new(MemoryBackend::new())), api)
    }

    mod sending {
        use super::*;

        #[tokio::test]
        async fn first_send_creates_session_lazily() {
            let manager = manager_with(StubApi::answering("Hello!"));
            assert!(manager.active().is_none());

            let reply = manager.send_message("Hi").await.unwrap();

            assert_eq!(reply.role, MessageRole::Assistant);
            assert_eq!(reply.content, "Hello!");
            let active = manager.active().unwrap();
            assert_eq!(active.title, "Hi...");
            assert_eq!(active.messages.len(), 2);
            assert_eq!(active.messages[0].role, MessageRole::User);
            assert_eq!(active.messages[1].role, MessageRole::Assistant);
        }

        #[tokio::test]
        async fn successful_exchange_is_persisted() {
            let manager = manager_with(StubApi::answering("42"));

            manager.send_message("What is the answer?").await.unwrap();

            let active = manager.active().unwrap();
            assert_eq!(manager.store().get(&active.id), Some(active));
        }

        #[tokio::test]
        async fn follow_ups_keep_title_and_order() {
            let api = StubApi::answering("ok");
            let manager = manager_with(api.clone());

            manager.send_message("first").await.unwrap();
            manager.send_message("second").await.unwrap();

            let active = manager.active().unwrap();
            assert_eq!(active.title, "first...");
            let contents: Vec<_> = active.messages.iter().map(|m| m.content.as_str()).collect();
            assert_eq!(contents, vec!["first", "ok", "second", "ok"]);
            assert_eq!(*api.questions.lock().unwrap(), vec!["first", "second"]);
            assert_eq!(manager.store().list().len(), 1);
        }

        #[tokio::test]
        async fn content_is_trimmed_and_empty_rejected() {
            let api = StubApi::answering("ok");
            let manager = manager_with(api.clone());

            assert_eq!(
                manager.send_message("   \n").await,
                Err(ChatError::EmptyMessage)
            );
            manager.send_message("  padded  ").await.unwrap();

            assert_eq!(*api.questions.lock().unwrap(), vec!["padded"]);
        }

        #[tokio::test]
        async fn failed_request_keeps_stored_history_and_records_error() {
            let manager = manager_with(StubApi::failing("No relevant context found."));

            let err = manager.send_message("anything?").await.unwrap_err();

            assert_eq!(err.to_string(), "No relevant context found.");
            assert_eq!(
                manager.last_error().as_deref(),
                Some("No relevant context found.")
            );
            assert!(!manager.is_pending());
            assert!(manager.store().list().is_empty());
            // The question stays visible in the open session.
            assert_eq!(manager.active().unwrap().messages.len(), 1);
        }

        #[tokio::test]
        async fn new_chat_clears_last_error() {
            let manager = manager_with(StubApi::failing("down"));
            let _ = manager.send_message("a").await;
            assert!(manager.last_error().is_some());

            manager.new_chat();
            assert!(manager.last_error().is_none());
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn second_send_while_pending_is_rejected() {
            let (release, gate) = mpsc::channel();
            let manager = Arc::new(manager_with(Arc::new(GatedApi {
                gate: Mutex::new(gate),
            })));

            let first = {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.send_message("first").await })
            };
            while !manager.is_pending() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }

            assert_eq!(
                manager.send_message("second").await,
                Err(ChatError::RequestPending)
            );

            release.send("answer".to_string()).unwrap();
            let reply = first.await.unwrap().unwrap();
            assert_eq!(reply.content, "answer");

            let active = manager.active().unwrap();
            let contents: Vec<_> = active.messages.iter().map(|m| m.content.as_str()).collect();
            assert_eq!(contents, vec!["first", "answer"]);
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn answer_lands_in_original_session_after_switch() {
            let (release, gate) = mpsc::channel();
            let manager = Arc::new(manager_with(Arc::new(GatedApi {
                gate: Mutex::new(gate),
            })));

            let first = {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.send_message("question").await })
            };
            while !manager.is_pending() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            let asked_in = manager.active().unwrap().id;
            let other = manager.new_chat();

            release.send("late answer".to_string()).unwrap();
            first.await.unwrap().unwrap();

            assert_eq!(manager.active().unwrap().id, other.id);
            let stored = manager.store().get(&asked_in).unwrap();
            assert_eq!(stored.messages.len(), 2);
            assert_eq!(stored.messages[1].content, "late answer");
        }
    }

    mod pending {
        use super::*;

        fn gated() -> (mpsc::Sender<String>, Arc<ChatSessionManager>) {
            let (release, gate) = mpsc::channel();
            let manager = manager_with(Arc::new(GatedApi {
                gate: Mutex::new(gate),
            }));
            (release, Arc::new(manager))
        }

        fn ask_in_background(
            manager: &Arc<ChatSessionManager>,
            question: &'static str,
        ) -> tokio::task::JoinHandle<Result<Message, ChatError>> {
            let manager = Arc::clone(manager);
            tokio::spawn(async move { manager.send_message(question).await })
        }

        async fn wait_until_pending(manager: &ChatSessionManager) {
            while !manager.is_pending() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        fn transcript(session: &Session) -> Vec<String> {
            session
                .messages
                .iter()
                .map(|m| format!("{}:{}", m.role, m.content))
                .collect()
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn dropped_send_releases_the_slot() {
            let (release, manager) = gated();

            let timed_out =
                tokio::time::timeout(Duration::from_millis(20), manager.send_message("slow")).await;
            assert!(timed_out.is_err());
            assert!(!manager.is_pending());

            release.send("late".to_string()).unwrap();
            release.send("fresh".to_string()).unwrap();
            assert!(manager.send_message("again").await.is_ok());
            assert!(!manager.is_pending());
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn reopening_the_same_chat_keeps_the_question() {
            let (release, manager) = gated();
            release.send("ok".to_string()).unwrap();
            manager.send_message("first").await.unwrap();
            let id = manager.active().unwrap().id;

            let second = ask_in_background(&manager, "second");
            wait_until_pending(&manager).await;
            manager.select_chat(&id).unwrap();
            release.send("late".to_string()).unwrap();
            second.await.unwrap().unwrap();

            let stored = manager.store().get(&id).unwrap();
            assert_eq!(
                transcript(&stored),
                vec!["user:first", "assistant:ok", "user:second", "assistant:late"]
            );
            assert_eq!(manager.active(), Some(stored));
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn attach_while_waiting_survives_the_answer() {
            let (release, manager) = gated();
            let question = ask_in_background(&manager, "q");
            wait_until_pending(&manager).await;

            manager.attach_document("late.pdf");
            release.send("a".to_string()).unwrap();
            question.await.unwrap().unwrap();

            let active = manager.active().unwrap();
            assert_eq!(active.pdf_filename.as_deref(), Some("late.pdf"));
            assert_eq!(manager.store().get(&active.id), Some(active));
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn deleting_the_chat_discards_its_answer() {
            let (release, manager) = gated();
            let question = ask_in_background(&manager, "q");
            wait_until_pending(&manager).await;
            let id = manager.active().unwrap().id;

            manager.delete_chat(&id);
            release.send("late".to_string()).unwrap();

            assert_eq!(question.await.unwrap(), Err(ChatError::Discarded));
            assert!(manager.store().get(&id).is_none());
            assert!(manager.active().is_none());
            assert!(manager.last_error().is_none());
            assert!(!manager.is_pending());
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn deleting_another_chat_keeps_the_answer() {
            let (release, manager) = gated();
            release.send("ok".to_string()).unwrap();
            manager.send_message("other").await.unwrap();
            let other = manager.active().unwrap().id;
            manager.new_chat();

            let question = ask_in_background(&manager, "q");
            wait_until_pending(&manager).await;
            manager.delete_chat(&other);
            release.send("a".to_string()).unwrap();

            let id = manager.active().unwrap().id;
            question.await.unwrap().unwrap();
            assert_eq!(manager.store().get(&id).unwrap().messages.len(), 2);
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn clearing_history_discards_pending_answer() {
            let (release, manager) = gated();
            let question = ask_in_background(&manager, "q");
            wait_until_pending(&manager).await;

            manager.clear_history();
            release.send("late".to_string()).unwrap();

            assert_eq!(question.await.unwrap(), Err(ChatError::Discarded));
            assert!(manager.store().list().is_empty());
        }
    }

    mod navigation {
        use super::*;

        #[tokio::test]
        async fn select_chat_opens_stored_session() {
            let manager = manager_with(StubApi::answering("ok"));
            manager.send_message("one").await.unwrap();
            let first = manager.active().unwrap();
            manager.new_chat();

            let selected = manager.select_chat(&first.id).unwrap();

            assert_eq!(selected, first);
            assert_eq!(manager.active(), Some(first));
        }

        #[test]
        fn select_unknown_chat_fails() {
            let manager = manager_with(StubApi::answering("ok"));
            assert_eq!(
                manager.select_chat("nope"),
                Err(ChatError::NotFound("nope".to_string()))
            );
        }

        #[test]
        fn new_chat_is_not_persisted_until_first_exchange() {
            let manager = manager_with(StubApi::answering("ok"));
            let session = manager.new_chat();

            assert_eq!(session.title, "New Conversation");
            assert!(manager.store().list().is_empty());
        }

        #[tokio::test]
        async fn delete_open_chat_closes_it() {
            let manager = manager_with(StubApi::answering("ok"));
            manager.send_message("one").await.unwrap();
            let id = manager.active().unwrap().id;

            manager.delete_chat(&id);

            assert!(manager.active().is_none());
            assert!(manager.store().get(&id).is_none());
        }

        #[tokio::test]
        async fn clear_history_empties_store() {
            let manager = manager_with(StubApi::answering("ok"));
            manager.send_message("one").await.unwrap();
            manager.new_chat();
            manager.send_message("two").await.unwrap();

            manager.clear_history();

            assert!(manager.active().is_none());
            assert!(manager.store().list().is_empty());
        }
    }

    mod documents {
        use super::*;

        #[test]
        fn attach_without_session_applies_to_next_one() {
            let manager = manager_with(StubApi::answering("ok"));

            assert!(manager.attach_document("report.pdf").is_none());
            let session = manager.new_chat();

            assert_eq!(session.pdf_filename.as_deref(), Some("report.pdf"));
        }

        #[tokio::test]
        async fn lazily_created_session_inherits_document() {
            let manager = manager_with(StubApi::answering("ok"));
            manager.attach_document("report.pdf");

            manager.send_message("summarize").await.unwrap();

            let stored = &manager.store().list()[0];
            assert_eq!(stored.pdf_filename.as_deref(), Some("report.pdf"));
        }

        #[tokio::test]
        async fn attach_to_saved_session_persists_immediately() {
            let manager = manager_with(StubApi::answering("ok"));
            manager.send_message("one").await.unwrap();

            let session = manager.attach_document("second.pdf").unwrap();

            assert_eq!(
                manager.store().get(&session.id).unwrap().pdf_filename.as_deref(),
                Some("second.pdf")
            );
        }

        #[test]
        fn attach_to_empty_session_is_not_saved() {
            let manager = manager_with(StubApi::answering("ok"));
            manager.new_chat();

            let session = manager.attach_document("doc.pdf").unwrap();

            assert_eq!(session.pdf_filename.as_deref(), Some("doc.pdf"));
            assert!(manager.store().list().is_empty());
        }
    }
}
