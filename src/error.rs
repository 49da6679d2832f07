//! Error types for the assistant orchestration core.

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Speech-input collaborator glitch. Retried with backoff by the listening loop.
    #[error("input error: {0}")]
    Input(String),

    /// Speech synthesis or playback failure.
    #[error("speech error: {0}")]
    Speech(String),

    /// Intent classifier failure. Dispatch falls back to the chat handler.
    #[error("classifier error: {0}")]
    Classifier(String),

    /// A chat, search, automation or image handler raised or reported failure.
    #[error("handler error: {0}")]
    Handler(String),

    /// Scratch resource could not be released. Logged, never escalated.
    #[error("cleanup error: {0}")]
    Cleanup(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// The assistant has shut down and no longer accepts work.
    #[error("assistant is shut down")]
    Shutdown,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistantError {
    /// Whether the error is a transient condition worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Input(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
