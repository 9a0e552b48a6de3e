//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use bytes::Bytes;
use clipdock_core::application::QueueStats;
use clipdock_core::domain::{MediaItem, UploadMessage, UploadMeta, UploadResult};
use serde::{Deserialize, Serialize};

/// media.upload.open.v1 - Start an upload stream
#[derive(Debug, Default, Deserialize)]
pub struct OpenUploadRequest {
    /// Producer label, for logs only
    #[serde(default)]
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenUploadResponse {
    pub stream_id: String,
}

/// One upload message: `{"meta": {...}}` or `{"data": "<base64>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMessage {
    Meta(UploadMeta),
    Data(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl From<WireMessage> for UploadMessage {
    fn from(message: WireMessage) -> Self {
        match message {
            WireMessage::Meta(meta) => UploadMessage::Meta(meta),
            WireMessage::Data(bytes) => UploadMessage::Data(Bytes::from(bytes)),
        }
    }
}

/// media.upload.send.v1 - Deliver the message numbered `seq` (starting at 0)
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub stream_id: String,
    pub seq: u64,
    pub message: WireMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageResponse {
    pub stream_id: String,
    pub next_seq: u64,
    /// The upload already has its terminal result; further messages are dropped
    pub finished: bool,
}

/// media.upload.close.v1 - End the stream after `seq` messages and wait for the result
#[derive(Debug, Deserialize)]
pub struct CloseUploadRequest {
    pub stream_id: String,
    pub seq: u64,
}

/// media.upload.abort.v1 - Fail the stream from the producer side
#[derive(Debug, Deserialize)]
pub struct AbortUploadRequest {
    pub stream_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Terminal result of an upload stream
#[derive(Debug, Clone, Serialize)]
pub struct UploadResultResponse {
    pub stream_id: String,
    pub accepted: bool,
    pub message: String,
    pub stored_path: Option<String>,
}

impl UploadResultResponse {
    pub fn new(stream_id: impl Into<String>, result: UploadResult) -> Self {
        Self {
            stream_id: stream_id.into(),
            accepted: result.accepted,
            message: result.message,
            stored_path: result.stored_path,
        }
    }
}

/// media.list.v1 - List stored media
#[derive(Debug, Default, Deserialize)]
pub struct ListMediaRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct ListMediaResponse {
    pub items: Vec<MediaItem>,
}

/// admin.stats.v1 - Queue and stream statistics
#[derive(Debug, Default, Deserialize)]
pub struct StatsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub queue: QueueStats,
    pub open_streams: usize,
    pub uptime_seconds: u64,
}

mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::Engine;
        ENGINE.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use base64::Engine;
        let s = String::deserialize(deserializer)?;
        ENGINE.decode(&s).map_err(serde::de::Error::custom)
    }
}
