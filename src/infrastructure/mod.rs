//! Infrastructure layer - external adapters (document store, cache, config files).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod config;
pub mod local_cache;
#[cfg(test)]
pub mod memory_store;
pub mod sqlite_store;
pub mod store;

pub use config::{
    config_file_path, ensure_config_exists, load_config, load_config_from_file, save_config,
};
pub use local_cache::{CacheInvalidator, LocalCache};
#[cfg(test)]
pub use memory_store::MemoryDocumentStore;
pub use sqlite_store::SqliteDocumentStore;
pub use store::{CollectionPath, DocumentStore, WriteOp};
