use std::collections::HashMap;
use std::sync::RwLock;

use crate::contracts::{
    CounterRows, LockResultExt, NoTransaction, SequenceCounter, SequenceStore, StorageError,
    StoreCapabilities,
};

/// In-memory counter table without transaction support.
///
/// Every row operation is individually atomic, but nothing spans a
/// read-increment-write cycle. Generators over this store run in degraded
/// mode: fine for tests and single-caller tools, unsafe for concurrent
/// production use.
#[derive(Default)]
pub struct MemorySequenceStore {
    rows: RwLock<HashMap<String, SequenceCounter>>,
}

impl MemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.rows.read().map_lock_err()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl CounterRows for MemorySequenceStore {
    fn find(&self, name: &str) -> Result<Option<SequenceCounter>, StorageError> {
        Ok(self.rows.read().map_lock_err()?.get(name).cloned())
    }

    fn insert(&self, counter: &SequenceCounter) -> Result<(), StorageError> {
        let mut rows = self.rows.write().map_lock_err()?;
        if rows.contains_key(&counter.name) {
            return Err(StorageError::CreateConflict(counter.name.clone()));
        }
        rows.insert(counter.name.clone(), counter.clone());
        Ok(())
    }

    fn update(&self, counter: &SequenceCounter) -> Result<(), StorageError> {
        let mut rows = self.rows.write().map_lock_err()?;
        match rows.get_mut(&counter.name) {
            Some(row) => {
                *row = counter.clone();
                Ok(())
            }
            None => Err(StorageError::CounterNotFound(counter.name.clone())),
        }
    }
}

impl SequenceStore for MemorySequenceStore {
    type Transaction<'a> = NoTransaction;

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::non_transactional()
    }

    fn begin(&self) -> Result<NoTransaction, StorageError> {
        Err(StorageError::Unsupported(
            "in-memory store has no transactions".into(),
        ))
    }

    fn counters(&self) -> Result<Vec<SequenceCounter>, StorageError> {
        let mut all: Vec<_> = self.rows.read().map_lock_err()?.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}
