//! # inferra-core
//!
//! Core logic for Inferra, a chat client for asking questions about an
//! uploaded document.
//!
//! This crate is framework-agnostic and can be used by:
//! - the `inferra` terminal client
//! - any other front end that can call into Rust
//!
//! ## Key Concepts
//!
//! - **Session**: one conversation thread with its messages and metadata
//! - **SessionStore**: the persisted collection of sessions, with change
//!   notification through a [`ChangeBus`]
//! - **SessionIndex**: the recency-sorted view of the store
//! - **Reveal**: progressive disclosure of an assistant reply

pub mod api;
pub mod change_bus;
pub mod config;
pub mod managers;
pub mod persistence;
pub mod reveal;

// Re-export commonly used types
pub use api::{ConversationApi, DocumentUploadApi, InferraClient, RequestError};
pub use change_bus::{ChangeBus, Subscription};
pub use config::Config;
pub use managers::{ChatError, ChatSessionManager};
pub use persistence::{Message, MessageRole, Session, SessionIndex, SessionStore};
pub use reveal::{RevealBoard, RevealConfig, RevealDriver, RevealFrame, RevealState};
