use thiserror::Error;

/// Top-level error type for TaskFlow.
#[derive(Debug, Error)]
pub enum TaskflowError {
    /// The store document (or a backup of it) could not be parsed.
    #[error("storage corruption: {0}")]
    StorageCorruption(String),

    /// Reading, writing, renaming, or locking the store file failed.
    #[error("storage io failure: {0}")]
    StorageIo(String),

    /// Unknown id, illegal status transition, or rejected input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The notification sender could not deliver a message.
    #[error("delivery failure: {0}")]
    Delivery(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaskflowError {
    /// Whether the error means "the thing you asked about does not exist / is not allowed".
    ///
    /// Handlers report these to the user; everything else gets a generic apology.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
