//! Persistence data types.
//!
//! # Data Model Overview
//!
//! The whole conversation history is stored as one JSON array under a single
//! backend key (`inferra-chat-sessions` by default):
//!
//! ```text
//! [
//!   {
//!     "id": "3f0c...",
//!     "title": "What is this document about?...",
//!     "messages": [{ "id": "...", "role": "user", "content": "...", "timestamp": "..." }],
//!     "createdAt": "2026-02-04T10:15:30.123Z",
//!     "updatedAt": "2026-02-04T10:15:42.001Z",
//!     "pdfFilename": "report.pdf"
//!   }
//! ]
//! ```
//!
//! # Design Principles
//!
//! - **Append-only messages**: a session's messages are never reordered or edited
//! - **Monotonic timestamps**: `updated_at` never moves backwards
//! - **Title set once**: derived from the first user message, then frozen

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to a session before it has any messages.
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Number of characters of the first message kept in a derived title.
pub const TITLE_MAX_CHARS: usize = 50;

/// Suffix appended to every derived title, whatever the message length.
pub const TITLE_SUFFIX: &str = "...";

// ============================================================================
// Message Types
// ============================================================================

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier (within its session).
    pub id: String,

    /// Message author.
    pub role: MessageRole,

    /// Full message text.
    pub content: String,

    /// When this message was created.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with a fresh id, stamped now.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// One conversation thread: ordered messages plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier, generated client-side.
    pub id: String,

    /// User-visible name shown in the history list.
    pub title: String,

    /// All messages, in insertion order.
    pub messages: Vec<Message>,

    /// When this session was created.
    pub created_at: DateTime<Utc>,

    /// When this session last received a message or metadata change.
    pub updated_at: DateTime<Utc>,

    /// Name of the document attached to this conversation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_filename: Option<String>,
}

impl Session {
    /// Create an empty session with the default title.
    pub fn new(pdf_filename: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            pdf_filename,
        }
    }

    /// Append a message.
    ///
    /// When this is the first message and it comes from the user, the title is
    /// derived from its content. The title is never touched again afterwards.
    pub fn push_message(&mut self, message: Message) {
        if self.messages.is_empty() && message.is_user() {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
        self.touch();
    }

    /// Attach (or replace) the document name for this session.
    pub fn set_pdf_filename(&mut self, filename: impl Into<String>) {
        self.pdf_filename = Some(filename.into());
        self.touch();
    }

    /// The most recent message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }
}

/// Build a session title from the first message.
///
/// Keeps the first [`TITLE_MAX_CHARS`] characters and always appends
/// [`TITLE_SUFFIX`], even when nothing was cut.
pub fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    title.push_str(TITLE_SUFFIX);
    title
}

// ============================================================================
// TESTS
// ============================================================================
