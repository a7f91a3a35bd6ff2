//! Domain layer - core types and rules.
//!
//! This layer contains the archive model, the collection registry,
//! configuration types and the error type, without any I/O.

pub mod archive;
pub mod error;
pub mod registry;
pub mod settings;
pub mod value;

pub use archive::{Archive, BackupAnalysis, ImportReport};
pub use error::{AppError, Result};
pub use registry::{REGISTRY, SINGLETON_COLLECTIONS};
pub use settings::{AppConfig, Ceilings};
pub use value::{StoreDocument, StoreFields, StoreValue};
