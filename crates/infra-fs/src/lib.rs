// clipdock Infrastructure - Filesystem Adapter
// Implements: StorageWriter (create-new files with collision policy), MediaCatalog

mod fs_catalog;
mod fs_writer;

pub use fs_catalog::FsMediaCatalog;
pub use fs_writer::{CollisionPolicy, FsStorageWriter, MAX_UNIQUIFY_ATTEMPTS};
