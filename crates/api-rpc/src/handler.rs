//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::to_rpc_error;
use crate::streams::StreamRegistry;
use crate::types::{
    AbortUploadRequest, CloseUploadRequest, ListMediaRequest, ListMediaResponse,
    OpenUploadRequest, OpenUploadResponse, SendMessageRequest, SendMessageResponse, StatsRequest,
    StatsResponse, UploadResultResponse,
};
use clipdock_core::application::ListingService;
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::Instant;

/// Reported when a producer aborts without giving a reason
const DEFAULT_ABORT_REASON: &str = "aborted by producer";

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    streams: Arc<StreamRegistry>,
    listing: ListingService,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(streams: Arc<StreamRegistry>, listing: ListingService) -> Self {
        Self {
            streams,
            listing,
            start_time: Instant::now(),
        }
    }

    /// media.upload.open.v1
    pub async fn open_upload(
        &self,
        params: OpenUploadRequest,
    ) -> Result<OpenUploadResponse, ErrorObjectOwned> {
        let stream_id = self.streams.open(params.source_id.as_deref());
        Ok(OpenUploadResponse { stream_id })
    }

    /// media.upload.send.v1
    pub async fn send_message(
        &self,
        params: SendMessageRequest,
    ) -> Result<SendMessageResponse, ErrorObjectOwned> {
        let ack = self
            .streams
            .send(&params.stream_id, params.seq, params.message.into())
            .await
            .map_err(to_rpc_error)?;

        Ok(SendMessageResponse {
            stream_id: params.stream_id,
            next_seq: ack.next_seq,
            finished: ack.finished,
        })
    }

    /// media.upload.close.v1
    pub async fn close_upload(
        &self,
        params: CloseUploadRequest,
    ) -> Result<UploadResultResponse, ErrorObjectOwned> {
        let result = self
            .streams
            .close(&params.stream_id, params.seq)
            .await
            .map_err(to_rpc_error)?;

        Ok(UploadResultResponse::new(params.stream_id, result))
    }

    /// media.upload.abort.v1
    pub async fn abort_upload(
        &self,
        params: AbortUploadRequest,
    ) -> Result<UploadResultResponse, ErrorObjectOwned> {
        let reason = params.reason.as_deref().unwrap_or(DEFAULT_ABORT_REASON);
        let result = self
            .streams
            .abort(&params.stream_id, reason)
            .await
            .map_err(to_rpc_error)?;

        Ok(UploadResultResponse::new(params.stream_id, result))
    }

    /// media.list.v1
    pub async fn list_media(
        &self,
        _params: ListMediaRequest,
    ) -> Result<ListMediaResponse, ErrorObjectOwned> {
        let items = self.listing.list().await.map_err(to_rpc_error)?;
        Ok(ListMediaResponse { items })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        Ok(StatsResponse {
            queue: self.streams.ingest().queue().stats(),
            open_streams: self.streams.open_streams(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        })
    }
}
