//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC types from api-rpc crate.

use serde::{Deserialize, Serialize};

/// Description of the file being uploaded (sent once, first)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMeta {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub source_id: String,
}

/// One upload message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMessage {
    Meta(UploadMeta),
    Data(#[serde(with = "base64_bytes")] Vec<u8>),
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenUploadRequest {
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OpenUploadResponse {
    pub stream_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SendMessageRequest<'a> {
    pub stream_id: &'a str,
    pub seq: u64,
    pub message: WireMessage,
}

/// Acknowledgement of one message
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    pub stream_id: String,
    pub next_seq: u64,
    /// The daemon already decided the result; stop sending and close
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CloseUploadRequest<'a> {
    pub stream_id: &'a str,
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AbortUploadRequest<'a> {
    pub stream_id: &'a str,
    pub reason: Option<String>,
}

/// Terminal result of an upload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadResult {
    pub stream_id: String,
    pub accepted: bool,
    pub message: String,
    pub stored_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct EmptyRequest {}

/// A stored video
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MediaItem {
    pub filename: String,
    pub url: String,
    pub size_bytes: u64,
    pub content_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ListMediaResponse {
    pub items: Vec<MediaItem>,
}

/// Queue counters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueStats {
    pub max_pending: usize,
    pub concurrency: usize,
    pub pending: usize,
    pub active: usize,
    pub admitted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Response from admin.stats.v1
#[derive(Debug, Clone, Deserialize)]
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
