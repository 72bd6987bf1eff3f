//! Persistence layer for chat sessions.
//!
//! # Overview
//!
//! - **Types** - `Session` and `Message`, plus the title rule
//! - **Backend** - scoped text key-value storage (memory or directory)
//! - **Store** - the session collection with upsert/delete/clear and change
//!   notification
//! - **Index** - the recency-sorted view shown in the history list
//!
//! # Design Principles
//!
//! ## Whole-Collection Writes
//!
//! Every mutation reads, changes and writes back the entire collection under
//! one key. There are no partial updates.
//!
//! ## Availability Over Visibility
//!
//! Storage failures are logged and swallowed. A broken payload reads as an
//! empty history instead of an error.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use inferra_core::persistence::{MemoryBackend, Message, Session, SessionIndex, SessionStore};
//!
//! let store = SessionStore::new(Arc::new(MemoryBackend::new()));
//! let index = SessionIndex::attach(&store);
//!
//! let mut session = Session::new(None);
//! session.push_message(Message::user("Hi"));
//! store.save(&session);
//!
//! assert_eq!(index.entries()[0].title, "Hi...");
//! ```

pub mod backend;
pub mod index;
pub mod store;
pub mod types;

pub use backend::{BackendError, FileBackend, MemoryBackend, PersistenceBackend};
pub use index::{sort_by_recency, SessionIndex, SessionSummary};
pub use store::{SessionStore, StoreChange, SESSIONS_KEY};
pub use types::*;
