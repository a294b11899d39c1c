//! The node's local LSM-style key-value storage: a memtable flushed to
//! timestamp-named SSTables, with an LRU cache of their indices.

pub mod actor;
pub mod engine;
pub mod error;

pub use actor::{StorageActor, StorageCommand};
pub use engine::{StorageConfig, StorageEngine};
pub use error::StorageError;
