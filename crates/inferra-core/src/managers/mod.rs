//! Core managers for Inferra state.
//!
//! These managers handle business logic and persistence without any
//! framework-specific dependencies. They can be used by:
//! - the terminal client
//! - a desktop or web shell embedding the core

pub mod chat_session;

pub use chat_session::{ChatError, ChatSessionManager};
