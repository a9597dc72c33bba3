pub mod error;
pub mod sequence;
pub mod store;

pub use error::{ConfigError, LockResultExt, SequenceError, StorageError};
pub use sequence::SequenceGenerator;
pub use store::{
    CounterRows, CounterTransaction, IsolationLevel, NoTransaction, SequenceCounter,
    SequenceStore, StoreCapabilities,
};
