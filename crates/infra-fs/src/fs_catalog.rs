// Filesystem Media Catalog - lists video files in the storage root

use async_trait::async_trait;
use clipdock_core::domain::{content_type_for, is_video_file, MediaFile};
use clipdock_core::port::{MediaCatalog, StorageError};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

pub struct FsMediaCatalog {
    root: PathBuf,
}

impl FsMediaCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MediaCatalog for FsMediaCatalog {
    /// Regular, non-hidden files with a video extension, sorted by name.
    /// A missing root lists as empty.
    async fn list(&self) -> Result<Vec<MediaFile>, StorageError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            if filename.starts_with('.') || !is_video_file(&filename) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Removed between read_dir and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }

            files.push(MediaFile {
                content_type: content_type_for(&filename).to_string(),
                size_bytes: metadata.len(),
                filename,
            });
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        debug!(root = %self.root.display(), count = files.len(), "Storage root scanned");
        Ok(files)
    }
}
