//! clipdock Client Implementation

use crate::error::Result;
use crate::producer::content_type_for;
use crate::types::{
    AbortUploadRequest, CloseUploadRequest, EmptyRequest, ListMediaResponse, MediaItem,
    OpenUploadRequest, OpenUploadResponse, SendMessageRequest, SendMessageResponse,
    StatsResponse, UploadMeta, UploadResult, WireMessage,
};
use crate::SdkError;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Bytes per data message
pub const CHUNK_SIZE: usize = 64 * 1024;

/// clipdock daemon client
///
/// # Example
///
/// ```no_run
/// use clipdock_sdk::ClipdockClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ClipdockClient::connect("http://127.0.0.1:50051").await?;
/// let stats = client.stats().await?;
/// println!("{} pending", stats.queue.pending);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClipdockClient {
    client: HttpClient,
}

impl ClipdockClient {
    /// Connect to a clipdock daemon
    ///
    /// # Arguments
    ///
    /// * `url` - RPC endpoint URL (e.g., `http://127.0.0.1:50051`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = url.as_ref();

        // Close waits for the write to be durable, which can take a while under load
        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(300))
            .build(url)
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Open an upload stream
    pub async fn open_upload(&self, source_id: impl Into<String>) -> Result<UploadStream<'_>> {
        let request = OpenUploadRequest {
            source_id: Some(source_id.into()),
        };
        let response: OpenUploadResponse = self
            .client
            .request("media.upload.open.v1", rpc_params![request])
            .await?;
        debug!(stream_id = %response.stream_id, "Upload stream opened");

        Ok(UploadStream {
            client: self,
            stream_id: response.stream_id,
            next_seq: 0,
            finished: false,
        })
    }

    /// Upload `data` under `meta`, in [`CHUNK_SIZE`] messages
    pub async fn upload_bytes(&self, meta: UploadMeta, data: &[u8]) -> Result<UploadResult> {
        let mut stream = self.open_upload(meta.source_id.clone()).await?;
        stream.send_meta(meta).await?;
        for chunk in data.chunks(CHUNK_SIZE) {
            if stream.is_finished() {
                break;
            }
            stream.send_data(chunk.to_vec()).await?;
        }
        stream.close().await
    }

    /// Stream a file from disk.
    ///
    /// The stream is aborted if reading the file fails midway.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        source_id: impl Into<String>,
    ) -> Result<UploadResult> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SdkError::Other(format!("{} has no usable file name", path.display())))?
            .to_string();

        let mut file = tokio::fs::File::open(path).await?;
        let size_bytes = file.metadata().await?.len();
        let meta = UploadMeta {
            content_type: content_type_for(&filename).to_string(),
            filename,
            size_bytes,
            source_id: source_id.into(),
        };

        let mut stream = self.open_upload(meta.source_id.clone()).await?;
        stream.send_meta(meta).await?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        while !stream.is_finished() {
            let n = match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    stream.abort(format!("read failed: {e}")).await?;
                    return Err(e.into());
                }
            };
            stream.send_data(buf[..n].to_vec()).await?;
        }

        stream.close().await
    }

    /// List stored media
    pub async fn list_media(&self) -> Result<Vec<MediaItem>> {
        let response: ListMediaResponse = self
            .client
            .request("media.list.v1", rpc_params![EmptyRequest::default()])
            .await?;
        Ok(response.items)
    }

    /// Queue and stream statistics
    pub async fn stats(&self) -> Result<StatsResponse> {
        let response: StatsResponse = self
            .client
            .request("admin.stats.v1", rpc_params![EmptyRequest::default()])
            .await?;
        Ok(response)
    }
}

/// An open upload stream.
///
/// Messages are numbered in send order; `close` ends the stream and returns the
/// daemon's terminal result.
pub struct UploadStream<'a> {
    client: &'a ClipdockClient,
    stream_id: String,
    next_seq: u64,
    finished: bool,
}

impl UploadStream<'_> {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// The daemon already has a result; more data would be dropped
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub async fn send_meta(&mut self, meta: UploadMeta) -> Result<SendMessageResponse> {
        self.send(WireMessage::Meta(meta)).await
    }

    pub async fn send_data(&mut self, chunk: Vec<u8>) -> Result<SendMessageResponse> {
        self.send(WireMessage::Data(chunk)).await
    }

    async fn send(&mut self, message: WireMessage) -> Result<SendMessageResponse> {
        let request = SendMessageRequest {
            stream_id: &self.stream_id,
            seq: self.next_seq,
            message,
        };
        let response: SendMessageResponse = self
            .client
            .client
            .request("media.upload.send.v1", rpc_params![request])
            .await?;

        self.next_seq = response.next_seq;
        self.finished = response.finished;
        Ok(response)
    }

    /// End the stream and wait for the result
    pub async fn close(self) -> Result<UploadResult> {
        let request = CloseUploadRequest {
            stream_id: &self.stream_id,
            seq: self.next_seq,
        };
        let result: UploadResult = self
            .client
            .client
            .request("media.upload.close.v1", rpc_params![request])
            .await?;
        Ok(result)
    }

    /// Fail the stream; the daemon discards what it buffered
    pub async fn abort(self, reason: impl Into<String>) -> Result<UploadResult> {
        let request = AbortUploadRequest {
            stream_id: &self.stream_id,
            reason: Some(reason.into()),
        };
        let result: UploadResult = self
            .client
            .client
            .request("media.upload.abort.v1", rpc_params![request])
            .await?;
        Ok(result)
    }
}
