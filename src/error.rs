//! Error taxonomy for the indexing and query pipelines.
//!
//! Batch operations never return these for a single file or commit; they are
//! rendered into the batch report instead. They surface as `Err` only for
//! failures that stop a whole run before any item is processed.

/// The repository reference could not be turned into documents.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("not authorized to read repository: {0}")]
    Unauthorized(String),

    #[error("rate limited by repository host (resets at {reset_at:?})")]
    RateLimited { reset_at: Option<i64> },

    #[error("invalid repository reference: {0}")]
    InvalidReference(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl LoadError {
    /// Whether retrying later can succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::RateLimited { .. } | LoadError::Transport(_))
    }
}

impl From<reqwest::Error> for LoadError {
    fn from(e: reqwest::Error) -> Self {
        LoadError::Transport(e.to_string())
    }
}

/// A summarize, embed, or generate call did not produce a usable result.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("model adapter unavailable: {0}")]
    Unavailable(String),

    #[error("model provider is disabled")]
    Disabled,

    #[error("model call timed out after {0}s")]
    Timeout(u64),

    #[error("empty response from model")]
    EmptyResponse,

    #[error("embedding has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        AdapterError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(e: serde_json::Error) -> Self {
        AdapterError::Unavailable(format!("malformed response: {e}"))
    }
}

/// A read or write against the store failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store call timed out after {0}s")]
    Timeout(u64),
}

/// Input rejected before any model call is made.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("top_k must be between 1 and {max}, got {got}")]
    TopKOutOfRange { got: usize, max: usize },

    #[error("unknown project: {0}")]
    UnknownProject(String),
}

/// Errors a query can return to its caller. Model and store failures are not
/// in this list: they degrade into an apologetic answer instead.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Fatal, pre-batch failures of an indexing run.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Fatal failures of a commit poll: the host could not be read, or the
/// stored hashes could not be loaded or the new rows written.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Project registry failures.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("project name must not be empty")]
    EmptyName,

    #[error("a project named '{0}' already exists")]
    Duplicate(String),

    #[error(transparent)]
    InvalidReference(#[from] LoadError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_retryable() {
        assert!(LoadError::RateLimited { reset_at: None }.is_retryable());
        assert!(LoadError::Transport("reset".into()).is_retryable());
        assert!(!LoadError::NotFound("a/b".into()).is_retryable());
        assert!(!LoadError::Unauthorized("a/b".into()).is_retryable());
    }

    #[test]
    fn test_validation_messages() {
        let e = ValidationError::TopKOutOfRange { got: 0, max: 20 };
        assert_eq!(e.to_string(), "top_k must be between 1 and 20, got 0");
        assert_eq!(
            ValidationError::EmptyQuestion.to_string(),
            "question must not be empty"
        );
    }
}
