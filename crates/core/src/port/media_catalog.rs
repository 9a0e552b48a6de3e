// Media Catalog Port
// Source of the stored-file listing

use crate::domain::MediaFile;
use crate::port::StorageError;
use async_trait::async_trait;

#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Stored media files, already filtered to known video types
    async fn list(&self) -> Result<Vec<MediaFile>, StorageError>;
}

pub mod mocks {
    use super::*;

    /// Fixed listing for tests
    pub struct StaticCatalog(pub Vec<MediaFile>);

    #[async_trait]
    impl MediaCatalog for StaticCatalog {
        async fn list(&self) -> Result<Vec<MediaFile>, StorageError> {
            Ok(self.0.clone())
        }
    }
}
