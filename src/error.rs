//! Error taxonomy for the question-answering pipeline.
//!
//! Every library operation returns [`Result<T>`]. The variants map onto the
//! failure classes callers must tell apart:
//!
//! | Variant | Raised when | Side effects |
//! |---------|-------------|--------------|
//! | [`QaError::InvalidArgument`] | bad caller input (empty question, rating out of range, `k == 0`) | none, rejected up front |
//! | [`QaError::Io`] | a file or directory read/write fails | prior durable state untouched |
//! | [`QaError::Embedding`] | the embedding provider is unreachable or returns garbage | prior index stays queryable |
//! | [`QaError::Generation`] | the generation provider fails | session not mutated |
//! | [`QaError::IndexWrite`] | persisting a built index fails | transaction rolled back |
//!
//! The CLI and configuration layers wrap these in [`anyhow::Error`].

use std::path::Path;

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, QaError>;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("index write error: {0}")]
    IndexWrite(String),

    #[error("index error: {0}")]
    Index(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl QaError {
    pub fn invalid(message: impl Into<String>) -> Self {
        QaError::InvalidArgument(message.into())
    }

    /// Wraps an I/O error with the operation and path that produced it.
    pub fn io(operation: &str, path: &Path, source: std::io::Error) -> Self {
        QaError::Io {
            context: format!("{} {}", operation, path.display()),
            source,
        }
    }

    /// Stable machine-readable code, used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            QaError::InvalidArgument(_) => "bad_request",
            QaError::Io { .. } => "io_error",
            QaError::Embedding(_) => "embedding_error",
            QaError::Generation(_) => "generation_error",
            QaError::IndexWrite(_) | QaError::Index(_) => "index_error",
            QaError::Serialization(_) | QaError::Config(_) => "internal",
        }
    }
}
