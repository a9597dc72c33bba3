use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{ffi, params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};

use crate::contracts::{
    CounterRows, CounterTransaction, SequenceCounter, SequenceStore, StorageError,
    StoreCapabilities,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sequence_counters (
        name          TEXT    NOT NULL PRIMARY KEY,
        current_value INTEGER NOT NULL DEFAULT 0 CHECK (current_value >= 0),
        prefix        TEXT    NOT NULL DEFAULT '',
        suffix        TEXT    NULL,
        pad_width     INTEGER NOT NULL DEFAULT 6 CHECK (pad_width >= 1),
        updated_at    TEXT    NOT NULL
    );
";

const SELECT_COLUMNS: &str =
    "SELECT name, current_value, prefix, suffix, pad_width, updated_at FROM sequence_counters";

/// Connection settings for [`SqliteSequenceStore`].
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file. Parent directories are created on open.
    pub path: PathBuf,
    /// How long a connection waits for a competing writer before the
    /// attempt is reported as an isolation conflict.
    pub busy_timeout: Duration,
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Creates a SqliteConfig from environment variables.
    ///
    /// Environment variables:
    /// - `DOCSEQ_SQLITE_PATH`: database file (default: `./data/sequences.db`)
    /// - `DOCSEQ_SQLITE_BUSY_TIMEOUT_MS`: busy timeout in ms (default: 5000)
    pub fn from_env() -> Self {
        let path = std::env::var("DOCSEQ_SQLITE_PATH")
            .unwrap_or_else(|_| "./data/sequences.db".into());
        let mut config = Self::new(path);
        if let Some(ms) = std::env::var("DOCSEQ_SQLITE_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.busy_timeout = Duration::from_millis(ms);
        }
        config
    }
}

/// Counter table in a SQLite database.
///
/// Every transaction gets its own connection and starts with
/// `BEGIN IMMEDIATE`, taking the database write lock before the counter is
/// read. SQLite transactions are serializable, so two writers can never
/// observe the same `current_value`. A writer that cannot get the lock
/// within the busy timeout fails with [`StorageError::IsolationConflict`].
pub struct SqliteSequenceStore {
    config: SqliteConfig,
}

impl SqliteSequenceStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with(SqliteConfig::new(path.as_ref()))
    }

    pub fn open_with(config: SqliteConfig) -> Result<Self, StorageError> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        let conn = connect(&config)?;
        // WAL keeps readers from blocking the single writer.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(map_sqlite_err)?;
        conn.execute_batch(SCHEMA).map_err(map_sqlite_err)?;

        tracing::info!(
            path = %config.path.display(),
            "Opened SQLite sequence store"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

fn connect(config: &SqliteConfig) -> Result<Connection, StorageError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(&config.path, flags).map_err(map_sqlite_err)?;
    conn.busy_timeout(config.busy_timeout)
        .map_err(map_sqlite_err)?;
    Ok(conn)
}

/// Busy and locked databases are contention, everything else is a plain
/// storage failure.
fn map_sqlite_err(e: rusqlite::Error) -> StorageError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StorageError::IsolationConflict(e.to_string())
        }
        _ => StorageError::Sqlite(e.to_string()),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, message) => {
            err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || (err.code == ErrorCode::ConstraintViolation
                    && message
                        .as_deref()
                        .is_some_and(|m| m.starts_with("UNIQUE constraint failed")))
        }
        _ => false,
    }
}

fn to_sql_int(name: &str, field: &str, value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| {
        StorageError::InvalidInput(format!(
            "{field} {value} of sequence {name} exceeds the SQLite integer range"
        ))
    })
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<SequenceCounter> {
    let current_value: i64 = row.get(1)?;
    let pad_width: i64 = row.get(4)?;
    let suffix: Option<String> = row.get(3)?;
    let updated_at: DateTime<Utc> = row.get(5)?;

    Ok(SequenceCounter {
        name: row.get(0)?,
        current_value: u64::try_from(current_value)
            .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(1, current_value))?,
        prefix: row.get(2)?,
        suffix: suffix.unwrap_or_default(),
        pad_width: u32::try_from(pad_width)
            .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(4, pad_width))?,
        updated_at,
    })
}

fn find_row(conn: &Connection, name: &str) -> Result<Option<SequenceCounter>, StorageError> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE name = ?1"),
        params![name],
        map_row,
    )
    .optional()
    .map_err(map_sqlite_err)
}

fn insert_row(conn: &Connection, counter: &SequenceCounter) -> Result<(), StorageError> {
    let value = to_sql_int(&counter.name, "current_value", counter.current_value)?;
    conn.execute(
        "INSERT INTO sequence_counters (name, current_value, prefix, suffix, pad_width, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            counter.name,
            value,
            counter.prefix,
            counter.suffix,
            i64::from(counter.pad_width),
            counter.updated_at,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            StorageError::CreateConflict(counter.name.clone())
        } else {
            map_sqlite_err(e)
        }
    })?;
    Ok(())
}

fn update_row(conn: &Connection, counter: &SequenceCounter) -> Result<(), StorageError> {
    let value = to_sql_int(&counter.name, "current_value", counter.current_value)?;
    let changed = conn
        .execute(
            "UPDATE sequence_counters SET current_value = ?2, updated_at = ?3 WHERE name = ?1",
            params![counter.name, value, counter.updated_at],
        )
        .map_err(map_sqlite_err)?;
    if changed == 0 {
        return Err(StorageError::CounterNotFound(counter.name.clone()));
    }
    Ok(())
}

/// A `BEGIN IMMEDIATE` transaction on a dedicated connection.
///
/// Dropped without commit, the transaction is rolled back.
pub struct SqliteTransaction {
    conn: Connection,
    finished: bool,
}

impl SqliteTransaction {
    fn begin(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(map_sqlite_err)?;
        Ok(Self {
            conn,
            finished: false,
        })
    }
}

impl CounterRows for SqliteTransaction {
    fn find(&self, name: &str) -> Result<Option<SequenceCounter>, StorageError> {
        find_row(&self.conn, name)
    }

    fn insert(&self, counter: &SequenceCounter) -> Result<(), StorageError> {
        insert_row(&self.conn, counter)
    }

    fn update(&self, counter: &SequenceCounter) -> Result<(), StorageError> {
        update_row(&self.conn, counter)
    }
}

impl CounterTransaction for SqliteTransaction {
    fn commit(mut self) -> Result<(), StorageError> {
        // On failure `finished` stays false and Drop rolls back.
        self.conn
            .execute_batch("COMMIT")
            .map_err(map_sqlite_err)?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self) -> Result<(), StorageError> {
        self.finished = true;
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(map_sqlite_err)
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.finished || self.conn.is_autocommit() {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::warn!(error = %e, "Failed to roll back abandoned sequence transaction");
        }
    }
}

/// Direct access runs each statement in its own autocommit connection.
impl CounterRows for SqliteSequenceStore {
    fn find(&self, name: &str) -> Result<Option<SequenceCounter>, StorageError> {
        find_row(&connect(&self.config)?, name)
    }

    fn insert(&self, counter: &SequenceCounter) -> Result<(), StorageError> {
        insert_row(&connect(&self.config)?, counter)
    }

    fn update(&self, counter: &SequenceCounter) -> Result<(), StorageError> {
        update_row(&connect(&self.config)?, counter)
    }
}

impl SequenceStore for SqliteSequenceStore {
    type Transaction<'a> = SqliteTransaction;

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::transactional()
    }

    fn begin(&self) -> Result<SqliteTransaction, StorageError> {
        SqliteTransaction::begin(connect(&self.config)?)
    }

    fn counters(&self) -> Result<Vec<SequenceCounter>, StorageError> {
        let conn = connect(&self.config)?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY name"))
            .map_err(map_sqlite_err)?;
        let rows = stmt.query_map([], map_row).map_err(map_sqlite_err)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)
    }
}
