use std::path::Path;
use std::time::Duration;

use rocksdb::{
    Direction, ErrorKind, IteratorMode, Options, TransactionDB, TransactionDBOptions,
    TransactionOptions, WriteOptions,
};

use crate::contracts::{
    CounterRows, CounterTransaction, SequenceCounter, SequenceStore, StorageError,
    StoreCapabilities,
};

/// Key prefix for counter rows
const COUNTER_PREFIX: &str = "ctr:";

/// Tuning for [`RocksDbSequenceStore`].
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// How long a transaction waits for a counter key locked by another
    /// transaction before failing with an isolation conflict.
    pub lock_timeout: Duration,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(1),
        }
    }
}

/// Counter table in a RocksDB `TransactionDB`.
///
/// Transactions are pessimistic: reading a counter with `get_for_update`
/// takes an exclusive lock on its key, whether or not the row exists yet.
/// A second writer for the same name waits for the first to finish, which
/// makes the read-increment-write cycle serializable per counter.
pub struct RocksDbSequenceStore {
    db: TransactionDB,
}

impl RocksDbSequenceStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with(path, RocksDbConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: RocksDbConfig) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let parallelism = std::thread::available_parallelism()
            .map(|p| p.get() as i32)
            .unwrap_or(2);
        opts.increase_parallelism(parallelism);

        let lock_timeout_ms = config.lock_timeout.as_millis() as i64;
        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(lock_timeout_ms);
        txn_db_opts.set_default_lock_timeout(lock_timeout_ms);

        let db = TransactionDB::open(&opts, &txn_db_opts, path)
            .map_err(|e| StorageError::RocksDb(e.to_string()))?;

        tracing::info!(path = %path.display(), "Opened RocksDB sequence store");
        Ok(Self { db })
    }

    fn counter_key(name: &str) -> String {
        format!("{}{}", COUNTER_PREFIX, name)
    }

    fn transaction(&self) -> RocksDbTransaction<'_> {
        // WAL stays on: an issued number must survive a crash.
        let write_opts = WriteOptions::default();
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_deadlock_detect(true);
        RocksDbTransaction {
            txn: self.db.transaction_opt(&write_opts, &txn_opts),
        }
    }

    /// Runs one row operation in its own short transaction.
    fn autocommit<T>(
        &self,
        op: impl FnOnce(&RocksDbTransaction<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let tx = self.transaction();
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn serialize_counter(counter: &SequenceCounter) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(counter).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn deserialize_counter(bytes: &[u8]) -> Result<SequenceCounter, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Lock waits, deadlocks and write conflicts are contention.
fn map_rocksdb_err(e: rocksdb::Error) -> StorageError {
    match e.kind() {
        ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
            StorageError::IsolationConflict(e.to_string())
        }
        _ => StorageError::RocksDb(e.to_string()),
    }
}

/// A pessimistic RocksDB transaction. Dropped without commit, its writes
/// are discarded.
pub struct RocksDbTransaction<'db> {
    txn: rocksdb::Transaction<'db, TransactionDB>,
}

impl RocksDbTransaction<'_> {
    fn locked_get(&self, key: &str) -> Result<Option<SequenceCounter>, StorageError> {
        self.txn
            .get_for_update(key.as_bytes(), true)
            .map_err(map_rocksdb_err)?
            .map(|bytes| deserialize_counter(&bytes))
            .transpose()
    }
}

impl CounterRows for RocksDbTransaction<'_> {
    fn find(&self, name: &str) -> Result<Option<SequenceCounter>, StorageError> {
        self.locked_get(&RocksDbSequenceStore::counter_key(name))
    }

    fn insert(&self, counter: &SequenceCounter) -> Result<(), StorageError> {
        let key = RocksDbSequenceStore::counter_key(&counter.name);
        if self.locked_get(&key)?.is_some() {
            return Err(StorageError::CreateConflict(counter.name.clone()));
        }
        self.txn
            .put(key.as_bytes(), serialize_counter(counter)?)
            .map_err(map_rocksdb_err)
    }

    fn update(&self, counter: &SequenceCounter) -> Result<(), StorageError> {
        let key = RocksDbSequenceStore::counter_key(&counter.name);
        if self.locked_get(&key)?.is_none() {
            return Err(StorageError::CounterNotFound(counter.name.clone()));
        }
        self.txn
            .put(key.as_bytes(), serialize_counter(counter)?)
            .map_err(map_rocksdb_err)
    }
}

impl CounterTransaction for RocksDbTransaction<'_> {
    fn commit(self) -> Result<(), StorageError> {
        self.txn.commit().map_err(map_rocksdb_err)
    }

    fn rollback(self) -> Result<(), StorageError> {
        self.txn.rollback().map_err(map_rocksdb_err)
    }
}

impl CounterRows for RocksDbSequenceStore {
    fn find(&self, name: &str) -> Result<Option<SequenceCounter>, StorageError> {
        self.db
            .get(Self::counter_key(name).as_bytes())
            .map_err(map_rocksdb_err)?
            .map(|bytes| deserialize_counter(&bytes))
            .transpose()
    }

    fn insert(&self, counter: &SequenceCounter) -> Result<(), StorageError> {
        self.autocommit(|tx| tx.insert(counter))
    }

    fn update(&self, counter: &SequenceCounter) -> Result<(), StorageError> {
        self.autocommit(|tx| tx.update(counter))
    }
}

impl SequenceStore for RocksDbSequenceStore {
    type Transaction<'a> = RocksDbTransaction<'a>;

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::transactional()
    }

    fn begin(&self) -> Result<RocksDbTransaction<'_>, StorageError> {
        Ok(self.transaction())
    }

    fn counters(&self) -> Result<Vec<SequenceCounter>, StorageError> {
        let prefix = COUNTER_PREFIX.as_bytes();
        let mut counters = Vec::new();

        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(map_rocksdb_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            counters.push(deserialize_counter(&value)?);
        }

        Ok(counters)
    }
}
