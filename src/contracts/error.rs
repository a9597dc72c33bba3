use std::sync::{PoisonError, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by [`SequenceGenerator`](crate::contracts::SequenceGenerator).
#[derive(Error, Debug)]
pub enum SequenceError {
    /// Empty or whitespace-only sequence name. Caller error, never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization failure while incrementing. Retried by the outer retry
    /// policy; surfaced only once the retry budget is exhausted.
    #[error("Isolation conflict on sequence {name}: {message}")]
    IsolationConflict { name: String, message: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Sequence overflow: {0}")]
    Overflow(String),

    /// The blocking task running the generator panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SequenceError {
    /// Returns true when restarting the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SequenceError::IsolationConflict { .. })
    }
}

/// Extension trait for converting lock errors to StorageError.
pub trait LockResultExt<T> {
    /// Converts a lock error to a StorageError.
    fn map_lock_err(self) -> Result<T, StorageError>;
}

impl<'a, T> LockResultExt<RwLockReadGuard<'a, T>>
    for Result<RwLockReadGuard<'a, T>, PoisonError<RwLockReadGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockReadGuard<'a, T>, StorageError> {
        self.map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}

impl<'a, T> LockResultExt<RwLockWriteGuard<'a, T>>
    for Result<RwLockWriteGuard<'a, T>, PoisonError<RwLockWriteGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockWriteGuard<'a, T>, StorageError> {
        self.map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(String),

    #[error("RocksDB error: {0}")]
    RocksDb(String),

    /// Another writer created the same counter concurrently.
    #[error("Counter already exists: {0}")]
    CreateConflict(String),

    /// The backend refused the transaction because of concurrent access
    /// (busy, locked, serialization failure).
    #[error("Isolation conflict: {0}")]
    IsolationConflict(String),

    #[error("Counter not found: {0}")]
    CounterNotFound(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid template for sequence {name}: {reason}")]
    InvalidTemplate { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_isolation_conflicts_are_retryable() {
        let conflict = SequenceError::IsolationConflict {
            name: "Customer".into(),
            message: "database is locked".into(),
        };
        assert!(conflict.is_retryable());

        assert!(!SequenceError::InvalidArgument("".into()).is_retryable());
        assert!(!SequenceError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(
            !SequenceError::Storage(StorageError::IsolationConflict("busy".into())).is_retryable()
        );
    }

    #[test]
    fn storage_errors_convert_into_sequence_errors() {
        let err: SequenceError = StorageError::Io("disk full".into()).into();
        assert!(matches!(err, SequenceError::Storage(StorageError::Io(_))));
        assert_eq!(err.to_string(), "Storage error: IO error: disk full");
    }
}
