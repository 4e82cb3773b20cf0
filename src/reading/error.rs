use std::time::Duration;
use thiserror::Error;

use crate::auth::AuthError;
use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Session {session_id} is corrupt: {reason}")]
    CorruptSession { session_id: String, reason: String },
    #[error("Interpretation failed: {0}")]
    Provider(#[from] LlmError),
    #[error("Interpretation timed out after {0:?}")]
    ProviderTimeout(Duration),
    #[error("Storage error: {0}")]
    Storage(#[from] duckdb::Error),
    #[error("Storage lock poisoned")]
    StoragePoisoned,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReadingError {
    /// Provider failures leave the session persisted up to the failed call,
    /// so the caller may simply repeat the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReadingError::Provider(_) | ReadingError::ProviderTimeout(_))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ReadingError::Validation(msg.into())
    }
}

pub type ReadingResult<T> = Result<T, ReadingError>;
