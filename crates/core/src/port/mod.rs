// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod media_catalog;
pub mod storage_writer;

// Re-exports
pub use id_provider::IdProvider;
pub use media_catalog::MediaCatalog;
pub use storage_writer::{MediaSink, StorageError, StorageWriter, StoredFile};
