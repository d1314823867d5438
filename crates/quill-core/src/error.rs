//! Error types for quillbox.

use thiserror::Error;

/// Result type alias using quillbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for quillbox operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// Malformed or out-of-range query parameters
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or invalid caller identity
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Backing-store failure surfaced without internal detail
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Network/stream-level failure mid-turn
    #[error("Stream transport error: {0}")]
    StreamTransport(String),

    /// Upstream model error with an optional machine-readable code
    #[error("Upstream model error: {message}")]
    UpstreamModel {
        /// Known codes: "rate_limit_exceeded", "insufficient_quota",
        /// "model_not_found". Unknown codes fall back to a generic message.
        code: Option<String>,
        message: String,
    },

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fallback message shown when no specific mapping exists.
pub const GENERIC_USER_MESSAGE: &str =
    "We couldn't complete the request. Please try again.";

impl Error {
    /// User-facing message for this error.
    ///
    /// Known upstream model codes map to specific friendly text; everything
    /// else collapses to a generic message so internal diagnostics never
    /// leak to callers.
    pub fn user_message(&self) -> String {
        match self {
            Error::UpstreamModel { code, .. } => match code.as_deref() {
                Some("rate_limit_exceeded") => {
                    "The assistant is receiving too many requests right now. \
                     Please wait a moment and try again."
                        .to_string()
                }
                Some("insufficient_quota") => {
                    "The assistant's usage quota has been exhausted. \
                     Please try again later."
                        .to_string()
                }
                Some("model_not_found") => {
                    "The configured assistant model is unavailable.".to_string()
                }
                _ => GENERIC_USER_MESSAGE.to_string(),
            },
            Error::Validation(msg) => msg.clone(),
            Error::Unauthorized(_) => "You are not signed in.".to_string(),
            _ => GENERIC_USER_MESSAGE.to_string(),
        }
    }

    /// Whether the error ends only the current turn (always true: nothing in
    /// this core is fatal to the process).
    pub fn is_turn_scoped(&self) -> bool {
        true
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
