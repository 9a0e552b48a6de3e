// Listing Service - stored uploads as playable media items

use crate::domain::MediaItem;
use crate::error::Result;
use crate::port::MediaCatalog;
use std::sync::Arc;
use tracing::debug;

pub struct ListingService {
    catalog: Arc<dyn MediaCatalog>,
}

impl ListingService {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }

    /// Stored video files, sorted by name.
    ///
    /// Reflects the catalog at call time: a file still being written may appear
    /// with its current size.
    pub async fn list(&self) -> Result<Vec<MediaItem>> {
        let mut files = self.catalog.list().await?;
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        debug!(count = files.len(), "Listed media");
        Ok(files.into_iter().map(MediaItem::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MediaFile;
    use crate::port::media_catalog::mocks::StaticCatalog;

    fn file(name: &str, size: u64) -> MediaFile {
        MediaFile {
            filename: name.to_string(),
            size_bytes: size,
            content_type: crate::domain::content_type_for(name).to_string(),
        }
    }

    #[tokio::test]
    async fn test_items_carry_url_and_are_sorted() {
        let service = ListingService::new(Arc::new(StaticCatalog(vec![
            file("b clip.webm", 200),
            file("a.mp4", 100),
        ])));

        let items = service.list().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].filename, "a.mp4");
        assert_eq!(items[0].url, "/media/a.mp4");
        assert_eq!(items[0].size_bytes, 100);
        assert_eq!(items[1].url, "/media/b%20clip.webm");
        assert_eq!(items[1].content_type, "video/webm");
    }

    #[tokio::test]
    async fn test_empty_catalog() {
        let service = ListingService::new(Arc::new(StaticCatalog(Vec::new())));
        assert!(service.list().await.unwrap().is_empty());
    }
}
