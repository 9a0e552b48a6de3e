// Domain Layer - Pure types and rules, no I/O

pub mod destination;
pub mod error;
pub mod media;
pub mod upload;

// Re-exports
pub use destination::DestinationName;
pub use error::DomainError;
pub use media::{content_type_for, is_video_file, media_url, MediaFile, MediaItem};
pub use upload::{StreamEvent, StreamId, UploadMessage, UploadMeta, UploadResult};
