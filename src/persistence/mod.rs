//! Durable, per-feature event storage.
//!
//! Events are appended as obfuscated records to rotating batch files (see [`encoding`]), one
//! directory per feature and consent state. [`FileOrchestrator`] decides which file is written
//! and which ones are safe to read; [`FeatureWriter`] serializes writes on a dedicated worker;
//! [`BatchReader`] feeds the upload scheduler.

mod config;
pub mod encoding;
mod error;
mod orchestrator;
mod reader;
mod storage;
mod writer;

#[doc(inline)]
pub use config::{
    PersistenceConfig, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_DISK_SPACE, DEFAULT_MAX_ITEMS_PER_BATCH,
    DEFAULT_MAX_ITEM_SIZE, DEFAULT_OLD_FILE_THRESHOLD, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_RECENT_DELAY,
};

#[doc(inline)]
pub use error::{StorageError, StorageErrorCode, StorageResult};

#[doc(inline)]
pub use orchestrator::FileOrchestrator;

#[doc(inline)]
pub use reader::{Batch, BatchReader};

#[doc(inline)]
pub use storage::ConsentAwareStorage;

#[doc(inline)]
pub use writer::{DataWriter, FeatureWriter, ImmediateWriter, NoOpWriter, SharedStorage};
