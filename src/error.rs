//! Error types for the conversation engine.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the conversation engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The completion request never completed or the connection dropped.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// A malformed event in the response stream.
    #[error("Frame decode error: {0}")]
    FrameDecode(String),

    /// A durable-store call rejected.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// An id looked up in a node store resolved to nothing.
    #[error("Dangling reference: {id}")]
    DanglingReference { id: String },

    /// Session-level invariant violations (duplicate id, double ephemeral).
    #[error("Session error: {0}")]
    Session(String),

    /// Session not found in the durable store.
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    /// The in-flight stream was cancelled.
    #[error("Stream cancelled")]
    Cancelled,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] Box<std::io::Error>),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),
}

impl Error {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a frame decode error.
    pub fn frame_decode(message: impl Into<String>) -> Self {
        Self::FrameDecode(message.into())
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Create a session error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session(message.into())
    }

    /// Create a dangling-reference error.
    pub fn dangling(id: impl Into<String>) -> Self {
        Self::DanglingReference { id: id.into() }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Box::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Box::new(value))
    }
}
