//! Error types for the finance chat assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Core Failure Taxonomy
    // =============================

    /// Domain/validation rejection from the backend; surfaced verbatim.
    #[error("Backend rejected request: {0}")]
    Api(String),

    /// Transient transport-level failure; retried on the next interaction.
    #[error("Network error: {0}")]
    Network(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Cache error: {0}")]
    State(String),

    #[error("Chat registry error: {0}")]
    Registry(String),

    #[error("Message transport error: {0}")]
    Transport(String),

    #[error("Update channel error: {0}")]
    Channel(String),

    #[error("Session error: {0}")]
    Session(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistantError {
    /// True for failures worth retrying on the next user interaction.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AssistantError::Network(_) | AssistantError::Http(_) | AssistantError::Channel(_)
        )
    }
}
