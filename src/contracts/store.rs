use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::error::StorageError;
use crate::storage::{format_number, CounterTemplate};

/// One persisted counter row.
///
/// # Invariants
/// - `name` is unique across all counters
/// - `current_value` is never decremented and never reused
/// - `pad_width >= 1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCounter {
    pub name: String,
    pub current_value: u64,
    pub prefix: String,
    pub suffix: String,
    pub pad_width: u32,
    pub updated_at: DateTime<Utc>,
}

impl SequenceCounter {
    /// Builds a fresh row (value 0) from a template.
    pub fn from_template(name: &str, template: &CounterTemplate, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            current_value: 0,
            prefix: template.prefix.clone(),
            suffix: template.suffix.clone(),
            pad_width: template.pad_width.max(1),
            updated_at: now,
        }
    }

    /// Advances the counter by one and stamps `updated_at`.
    /// Returns `None` (leaving the row untouched) on overflow.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Option<u64> {
        let next = self.current_value.checked_add(1)?;
        self.current_value = next;
        self.updated_at = now;
        Some(next)
    }

    /// Renders `prefix + zero_pad(current_value, pad_width) + suffix`.
    pub fn format(&self) -> String {
        format_number(self.current_value, self.pad_width, &self.prefix, &self.suffix)
    }
}

/// Isolation a backend can provide for the read-increment-write cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// No transactions at all.
    None,
    /// Serializable or equivalent: concurrent increments cannot both read
    /// the same value.
    Serializable,
}

/// What a [`SequenceStore`] is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub supports_transactions: bool,
    pub isolation: IsolationLevel,
}

impl StoreCapabilities {
    pub const fn transactional() -> Self {
        Self {
            supports_transactions: true,
            isolation: IsolationLevel::Serializable,
        }
    }

    pub const fn non_transactional() -> Self {
        Self {
            supports_transactions: false,
            isolation: IsolationLevel::None,
        }
    }
}

/// Row-level access to counters, shared by transactions and direct access.
pub trait CounterRows {
    /// Reads the row for `name`.
    fn find(&self, name: &str) -> Result<Option<SequenceCounter>, StorageError>;

    /// Inserts a new row.
    /// Fails with [`StorageError::CreateConflict`] if the name already exists.
    fn insert(&self, counter: &SequenceCounter) -> Result<(), StorageError>;

    /// Overwrites an existing row.
    /// Fails with [`StorageError::CounterNotFound`] if the row is missing.
    fn update(&self, counter: &SequenceCounter) -> Result<(), StorageError>;
}

/// A unit of work opened by [`SequenceStore::begin`].
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls
/// it back.
pub trait CounterTransaction: CounterRows {
    fn commit(self) -> Result<(), StorageError>;

    fn rollback(self) -> Result<(), StorageError>;
}

/// Durable table of named counters.
///
/// The store itself implements [`CounterRows`] for direct (autocommit)
/// access; backends that support transactions also hand out
/// [`CounterTransaction`]s at their strongest isolation level.
pub trait SequenceStore: CounterRows + Send + Sync {
    type Transaction<'a>: CounterTransaction
    where
        Self: 'a;

    fn capabilities(&self) -> StoreCapabilities;

    /// Opens a transaction at the strongest available isolation level.
    /// Backends without transactions return [`StorageError::Unsupported`].
    fn begin(&self) -> Result<Self::Transaction<'_>, StorageError>;

    /// Lists every counter row, ordered by name.
    fn counters(&self) -> Result<Vec<SequenceCounter>, StorageError>;
}

/// Transaction type for backends that have none. Cannot be constructed.
#[derive(Debug)]
pub enum NoTransaction {}

impl CounterRows for NoTransaction {
    fn find(&self, _name: &str) -> Result<Option<SequenceCounter>, StorageError> {
        match *self {}
    }

    fn insert(&self, _counter: &SequenceCounter) -> Result<(), StorageError> {
        match *self {}
    }

    fn update(&self, _counter: &SequenceCounter) -> Result<(), StorageError> {
        match *self {}
    }
}

impl CounterTransaction for NoTransaction {
    fn commit(self) -> Result<(), StorageError> {
        match self {}
    }

    fn rollback(self) -> Result<(), StorageError> {
        match self {}
    }
}
