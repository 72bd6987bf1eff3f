//! Boundary to the document Q&A backend.
//!
//! The chat core only needs two things from the backend: an answer for a
//! question, and a filename for an uploaded document. Both are traits so the
//! controller can be driven by a stub in tests; [`InferraClient`] is the
//! blocking HTTP implementation.
//!
//! # Endpoints
//!
//! | Method | Path          | Body                     | Response                 |
//! |--------|---------------|--------------------------|--------------------------|
//! | GET    | `/`           |                          | any 2xx means healthy    |
//! | POST   | `/ask`        | `{"question": "..."}`    | `{"answer": "..."}`      |
//! | POST   | `/upload_pdf` | multipart field `file`   | `{"filename": "..."}`    |

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::multipart;
use serde::Deserialize;
use thiserror::Error;

/// Default backend address.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

const ASK_FAILED: &str = "Failed to get answer";
const UPLOAD_FAILED: &str = "Failed to upload PDF";

/// A failed backend call. The `Display` text is meant for the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The backend answered with an error status.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The request never got a response (connection refused, timeout, etc.)
    #[error("{message}")]
    Transport { message: String, detail: String },

    /// The response body wasn't what we expected.
    #[error("{message}")]
    InvalidResponse { message: String, detail: String },

    /// The request couldn't be built (unreadable file, etc.)
    #[error("{0}")]
    Local(String),
}

/// Answers questions about the uploaded document.
pub trait ConversationApi: Send + Sync {
    fn ask_question(&self, question: &str) -> Result<String, RequestError>;
}

/// Uploads a document and returns the name the backend stored it under.
pub trait DocumentUploadApi: Send + Sync {
    fn upload_document(&self, path: &Path) -> Result<String, RequestError>;
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    answer: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Blocking HTTP client for the backend.
///
/// JSON calls go through a `ureq` agent. Uploads use `reqwest`'s blocking
/// multipart client, built per upload so the client never lives inside an
/// async context.
#[derive(Clone)]
pub struct InferraClient {
    base_url: String,
    timeout: Duration,
    agent: ureq::Agent,
}

impl InferraClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            base_url,
            timeout,
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the backend answers on its root path.
    pub fn check_health(&self) -> bool {
        match self.agent.get(&format!("{}/", self.base_url)).call() {
            Ok(_) => true,
            Err(e) => {
                log::debug!("Health check against {} failed: {}", self.base_url, e);
                false
            }
        }
    }
}

impl Default for InferraClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL, DEFAULT_TIMEOUT)
    }
}

impl ConversationApi for InferraClient {
    fn ask_question(&self, question: &str) -> Result<String, RequestError> {
        let url = format!("{}/ask", self.base_url);
        log::debug!("POST {} ({} chars)", url, question.chars().count());

        let response = self
            .agent
            .post(&url)
            .send_json(serde_json::json!({ "question": question }))
            .map_err(|e| request_error(e, ASK_FAILED))?;

        let body: AskResponse =
            response
                .into_json()
                .map_err(|e| RequestError::InvalidResponse {
                    message: ASK_FAILED.to_string(),
                    detail: e.to_string(),
                })?;
        Ok(body.answer)
    }
}

impl DocumentUploadApi for InferraClient {
    fn upload_document(&self, path: &Path) -> Result<String, RequestError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RequestError::Local(format!("Invalid file name: {}", path.display())))?;
        let bytes = std::fs::read(path)
            .map_err(|e| RequestError::Local(format!("Failed to read {}: {e}", path.display())))?;

        let url = format!("{}/upload_pdf", self.base_url);
        log::debug!("POST {} ({} bytes)", url, bytes.len());

        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| RequestError::Local(format!("Invalid upload part: {e}")))?;
        let form = multipart::Form::new().part("file", part);

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| RequestError::Local(format!("Failed to build upload client: {e}")))?;

        let response = client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|e| RequestError::Transport {
                message: UPLOAD_FAILED.to_string(),
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RequestError::Status {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or_else(|| UPLOAD_FAILED.to_string()),
            });
        }

        let body: UploadResponse = response.json().map_err(|e| RequestError::InvalidResponse {
            message: UPLOAD_FAILED.to_string(),
            detail: e.to_string(),
        })?;

        body.filename.ok_or_else(|| RequestError::InvalidResponse {
            message: body.message.unwrap_or_else(|| "Upload failed".to_string()),
            detail: "response has no filename".to_string(),
        })
    }
}

fn request_error(error: ureq::Error, fallback: &str) -> RequestError {
    match error {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            RequestError::Status {
                status,
                message: error_message(&body).unwrap_or_else(|| fallback.to_string()),
            }
        }
        ureq::Error::Transport(transport) => RequestError::Transport {
            message: fallback.to_string(),
            detail: transport.to_string(),
        },
    }
}

/// Pull a human-readable message out of an error body.
///
/// Looks at `message` first, then `detail` (the backend's own error field).
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "detail"]
        .iter()
        .find_map(|field| value.get(field).and_then(|v| v.as_str()))
        .map(str::to_string)
}

// ============================================================================
// TESTS
// ============================================================================
