use crate::blocks::BlockId;
use thiserror::Error;

/// Errors from a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("access denied for document {0}")]
    AccessDenied(String),

    /// Anything else the backing store reports (I/O, SQL, serialization).
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Access failures go back to the caller as-is; everything else may
    /// succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::AccessDenied(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound(String::from("no rows")),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditorError {
    #[error("block not found: {0}")]
    BlockNotFound(BlockId),

    #[error("operation not supported on block {0}")]
    UnsupportedOperation(BlockId),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("no home directory to place config in")]
    ProjectDir,
}

/// Failures surfaced by an editing session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Editor(#[from] EditorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_is_not_retryable() {
        assert!(StoreError::Storage("disk full".into()).is_retryable());
        assert!(StoreError::NotFound("doc".into()).is_retryable());
        assert!(!StoreError::AccessDenied("doc".into()).is_retryable());
    }

    #[test]
    fn messages_name_the_block() {
        let err = EditorError::BlockNotFound(BlockId::from("b-1"));
        assert_eq!(err.to_string(), "block not found: b-1");
    }
}
