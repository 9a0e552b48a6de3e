// Upload stream model: inbound messages, transport events, terminal result

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Stream identifier assigned by the transport
pub type StreamId = String;

/// Producer-supplied description of the file being uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMeta {
    pub filename: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub source_id: String,
}

/// One inbound message: metadata (first one wins) or a data chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadMessage {
    Meta(UploadMeta),
    Data(Bytes),
}

/// Events delivered by the transport to a session, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Message(UploadMessage),
    /// Client signalled end-of-stream
    End,
    /// Stream-level failure (client abort, idle timeout, dropped connection)
    Error(String),
}

pub const MSG_COMPLETED: &str = "Upload completed.";
pub const MSG_QUEUE_FULL: &str = "Queue full. Upload dropped.";
pub const MSG_NO_METADATA: &str = "Upload not accepted: stream ended before metadata.";
pub const MSG_ADMISSION_TIMEOUT: &str =
    "Upload queued; write had not started before the admission wait elapsed.";

/// Terminal response of one upload stream.
///
/// `accepted = true` with a `stored_path` means the file was written and synced
/// before the response was sent. `accepted = true` without `stored_path` only
/// happens when the admission wait elapsed: the upload is queued and its bytes are
/// held for the job, but durability is not yet guaranteed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub accepted: bool,
    pub message: String,
    pub stored_path: Option<String>,
}

impl UploadResult {
    pub fn completed(stored_path: impl Into<String>) -> Self {
        Self {
            accepted: true,
            message: MSG_COMPLETED.to_string(),
            stored_path: Some(stored_path.into()),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
            stored_path: None,
        }
    }

    pub fn queue_full() -> Self {
        Self::rejected(MSG_QUEUE_FULL)
    }

    pub fn stream_error(cause: &str) -> Self {
        Self::rejected(format!("Stream error: {cause}"))
    }

    pub fn storage_failed(cause: impl std::fmt::Display) -> Self {
        Self::rejected(format!("Storage write failed: {cause}"))
    }

    pub fn admission_timeout(accepted: bool) -> Self {
        Self {
            accepted,
            message: MSG_ADMISSION_TIMEOUT.to_string(),
            stored_path: None,
        }
    }
}
