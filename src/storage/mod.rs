mod async_sequence;
mod config;
mod format;
mod memory;
mod retry;
mod rocksdb;
mod sequence;
mod sqlite;

pub use async_sequence::AsyncSequenceGenerator;
pub use config::GeneratorConfig;
pub use format::{
    derive_prefix, format_number, CounterTemplate, DEFAULT_PAD_WIDTH, FALLBACK_PREFIX,
};
pub use memory::MemorySequenceStore;
pub use retry::{retry_on_conflict, RetryConfig};
pub use self::rocksdb::{RocksDbConfig, RocksDbSequenceStore, RocksDbTransaction};
pub use sequence::StoreSequenceGenerator;
pub use sqlite::{SqliteConfig, SqliteSequenceStore, SqliteTransaction};
