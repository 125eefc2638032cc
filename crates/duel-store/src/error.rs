//! Error types for the storage layer.

use std::time::Duration;

/// Errors a store can report.
///
/// Callers must be able to tell a uniqueness violation apart from every
/// other failure: display-name generation retries on it, and player
/// persistence treats it as "already recorded".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record matches the key.
    #[error("{0} not found")]
    NotFound(String),

    /// A record with the same unique key already exists.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The store did not answer within the configured bound.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// Any other storage failure.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// `true` for [`StoreError::UniqueViolation`].
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}
