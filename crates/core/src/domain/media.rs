// Stored media as shown by the listing

use serde::{Deserialize, Serialize};
use std::path::Path;

/// URL prefix under which an external static server exposes the storage root
pub const MEDIA_URL_PREFIX: &str = "/media/";

/// Known video extensions (lowercase) and their content types.
///
/// Mirrored by the SDK producer's scan filter; keep both tables in sync.
const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
];

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A file found in the storage root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub filename: String,
    pub size_bytes: u64,
    pub content_type: String,
}

/// A listing entry with its public URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub filename: String,
    pub url: String,
    pub size_bytes: u64,
    pub content_type: String,
}

impl From<MediaFile> for MediaItem {
    fn from(file: MediaFile) -> Self {
        Self {
            url: media_url(&file.filename),
            filename: file.filename,
            size_bytes: file.size_bytes,
            content_type: file.content_type,
        }
    }
}

fn extension_lowercase(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Content type guessed from the extension (case-insensitive)
pub fn content_type_for(filename: &str) -> &'static str {
    extension_lowercase(filename)
        .and_then(|ext| {
            VIDEO_TYPES
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, content_type)| *content_type)
        })
        .unwrap_or(FALLBACK_CONTENT_TYPE)
}

/// Listing filter: only `.mp4`, `.webm` and `.mov` files are media
pub fn is_video_file(filename: &str) -> bool {
    extension_lowercase(filename)
        .map(|ext| VIDEO_TYPES.iter().any(|(known, _)| *known == ext))
        .unwrap_or(false)
}

pub fn media_url(filename: &str) -> String {
    format!("{}{}", MEDIA_URL_PREFIX, urlencoding::encode(filename))
}
