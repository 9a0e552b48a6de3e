// Ingest Service - opens one session per inbound upload stream

pub mod constants;
mod session;
mod upload_job;

pub use constants::*;
pub use session::{IngestSession, SessionState};
pub use upload_job::{chunk_feed, FeedItem, FeedReceiver, FeedSender, UploadJob};

use crate::application::queue::BoundedQueue;
use crate::domain::{StreamEvent, StreamId, UploadResult};
use crate::port::StorageWriter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, Instrument};

/// Session tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestConfig {
    pub admission_wait: Duration,
    pub event_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            admission_wait: DEFAULT_ADMISSION_WAIT,
            event_capacity: SESSION_EVENT_CAPACITY,
        }
    }
}

/// Upload ingest use case
#[derive(Clone)]
pub struct IngestService {
    queue: BoundedQueue<UploadJob>,
    writer: Arc<dyn StorageWriter>,
    config: IngestConfig,
}

impl IngestService {
    pub fn new(
        queue: BoundedQueue<UploadJob>,
        writer: Arc<dyn StorageWriter>,
        config: IngestConfig,
    ) -> Self {
        Self {
            queue,
            writer,
            config,
        }
    }

    pub fn queue(&self) -> &BoundedQueue<UploadJob> {
        &self.queue
    }

    /// Spawn a session for a new stream and return the transport's side of it
    pub fn open_session(&self, stream_id: impl Into<StreamId>) -> SessionHandle {
        let stream_id = stream_id.into();
        let (events_tx, events_rx) = mpsc::channel(self.config.event_capacity.max(1));
        let (result_tx, result_rx) = watch::channel(None);

        let session = IngestSession::new(
            stream_id.clone(),
            self.queue.clone(),
            Arc::clone(&self.writer),
            self.config.admission_wait,
        );
        let span = tracing::info_span!("upload", stream_id = %stream_id);
        tokio::spawn(
            async move {
                let result = session.run(events_rx).await;
                let _ = result_tx.send(Some(result));
            }
            .instrument(span),
        );

        SessionHandle {
            stream_id,
            events: events_tx,
            result: result_rx,
        }
    }
}

/// Transport-facing handle of a running session.
///
/// Dropping every clone of the handle before sending `End` is treated as a
/// transport failure by the session.
#[derive(Clone)]
pub struct SessionHandle {
    stream_id: StreamId,
    events: mpsc::Sender<StreamEvent>,
    result: watch::Receiver<Option<UploadResult>>,
}

impl SessionHandle {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Deliver the next stream event.
    ///
    /// Returns false once the session has responded; the event is discarded.
    pub async fn send(&self, event: StreamEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Terminal response, if already decided
    pub fn try_result(&self) -> Option<UploadResult> {
        self.result.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.result.borrow().is_some()
    }

    /// Wait for the terminal response
    pub async fn result(&self) -> UploadResult {
        let mut rx = self.result.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            error!(stream_id = %self.stream_id, "Upload session ended without a response");
            UploadResult::rejected("Upload session terminated unexpectedly")
        })
    }
}
