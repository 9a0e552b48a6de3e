//! clipdock SDK - Rust Client Library
//!
//! Streams files to a clipdock daemon and lists what it has stored.
//!
//! # Example
//!
//! ```no_run
//! use clipdock_sdk::ClipdockClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect to daemon
//!     let client = ClipdockClient::connect("http://127.0.0.1:50051").await?;
//!
//!     // Upload a file in 64 KiB chunks
//!     let result = client.upload_file("videos/clip.mp4", "producer-1").await?;
//!     println!("{} ({})", result.message, result.accepted);
//!
//!     for item in client.list_media().await? {
//!         println!("{} -> {}", item.filename, item.url);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
pub mod producer;
mod types;

pub use client::{ClipdockClient, UploadStream, CHUNK_SIZE};
pub use error::{Result, SdkError};
pub use types::{
    MediaItem, QueueStats, SendMessageResponse, StatsResponse, UploadMeta, UploadResult,
    WireMessage,
};
