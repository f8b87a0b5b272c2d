mod queue;
mod store;

pub use queue::{QueueAttribute, QueueRecord, QueueType};
pub use store::{
    DeleteOutcome, QueueCursor, QueueFilter, QueueStore, RocksQueueStore, StoreConfig,
    UpdateOutcome,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("Queue already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
