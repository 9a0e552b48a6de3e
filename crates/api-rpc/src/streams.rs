//! Upload Stream Registry
//!
//! Maps stream ids to live ingest sessions. Each stream is a sequence of
//! independent RPC calls, so message order is enforced by `seq`: a stream accepts
//! exactly the next number, acknowledges a repeated one without delivering it
//! again, and refuses gaps.

use clipdock_core::application::{IngestService, SessionHandle, ShutdownToken};
use clipdock_core::domain::{StreamEvent, StreamId, UploadMessage, UploadResult};
use clipdock_core::error::{AppError, Result};
use clipdock_core::port::IdProvider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// An open stream with no call for this long is failed (60s)
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a finished stream's result stays available to `close` (60s)
pub const DEFAULT_RESULT_RETENTION: Duration = Duration::from_secs(60);

/// Reaper tick (1s)
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Cause reported to a session whose producer went silent
pub const IDLE_TIMEOUT_CAUSE: &str = "idle timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRegistryConfig {
    pub idle_timeout: Duration,
    pub result_retention: Duration,
    pub reap_interval: Duration,
}

impl Default for StreamRegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            result_retention: DEFAULT_RESULT_RETENTION,
            reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

/// Acknowledgement of one delivered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendAck {
    pub next_seq: u64,
    pub finished: bool,
}

struct StreamSlot {
    handle: SessionHandle,
    next_seq: u64,
    /// End or Error was delivered; no more messages
    closed: bool,
    last_activity: Instant,
}

type SharedSlot = Arc<tokio::sync::Mutex<StreamSlot>>;

pub struct StreamRegistry {
    ingest: IngestService,
    id_provider: Arc<dyn IdProvider>,
    config: StreamRegistryConfig,
    streams: Mutex<HashMap<StreamId, SharedSlot>>,
}

impl StreamRegistry {
    pub fn new(
        ingest: IngestService,
        id_provider: Arc<dyn IdProvider>,
        config: StreamRegistryConfig,
    ) -> Self {
        Self {
            ingest,
            id_provider,
            config,
            streams: Mutex::new(HashMap::new()),
        }
    }

    pub fn ingest(&self) -> &IngestService {
        &self.ingest
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<StreamId, SharedSlot>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, stream_id: &str) -> Result<SharedSlot> {
        self.streams()
            .get(stream_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Upload stream {stream_id} not found")))
    }

    /// Open a stream and its ingest session
    pub fn open(&self, source_id: Option<&str>) -> StreamId {
        let stream_id = self.id_provider.generate_id();
        let handle = self.ingest.open_session(stream_id.clone());
        self.streams().insert(
            stream_id.clone(),
            Arc::new(tokio::sync::Mutex::new(StreamSlot {
                handle,
                next_seq: 0,
                closed: false,
                last_activity: Instant::now(),
            })),
        );
        info!(
            stream_id = %stream_id,
            source_id = source_id.unwrap_or("-"),
            "Upload stream opened"
        );
        stream_id
    }

    /// Deliver message number `seq`
    pub async fn send(&self, stream_id: &str, seq: u64, message: UploadMessage) -> Result<SendAck> {
        let slot = self.slot(stream_id)?;
        let mut slot = slot.lock().await;

        if slot.closed {
            return Err(AppError::Conflict(format!(
                "Upload stream {stream_id} is already closed"
            )));
        }
        if seq < slot.next_seq {
            debug!(stream_id = %stream_id, seq, "Repeated message acknowledged");
            slot.last_activity = Instant::now();
            return Ok(SendAck {
                next_seq: slot.next_seq,
                finished: slot.handle.is_finished(),
            });
        }
        if seq > slot.next_seq {
            return Err(AppError::Conflict(format!(
                "Upload stream {stream_id} expected seq {}, got {seq}",
                slot.next_seq
            )));
        }

        let delivered = slot.handle.send(StreamEvent::Message(message)).await;
        slot.next_seq += 1;
        slot.last_activity = Instant::now();

        Ok(SendAck {
            next_seq: slot.next_seq,
            finished: !delivered || slot.handle.is_finished(),
        })
    }

    /// End the stream after `seq` messages and wait for its terminal result.
    ///
    /// Closing an already closed stream returns the same result.
    pub async fn close(&self, stream_id: &str, seq: u64) -> Result<UploadResult> {
        let handle = {
            let slot = self.slot(stream_id)?;
            let mut slot = slot.lock().await;
            if !slot.closed {
                if seq != slot.next_seq {
                    return Err(AppError::Conflict(format!(
                        "Upload stream {stream_id} closed after {seq} messages, but {} were delivered",
                        slot.next_seq
                    )));
                }
                slot.closed = true;
                slot.last_activity = Instant::now();
                slot.handle.send(StreamEvent::End).await;
            }
            slot.handle.clone()
        };

        let result = handle.result().await;
        debug!(stream_id = %stream_id, accepted = result.accepted, "Upload stream closed");
        Ok(result)
    }

    /// Fail the stream on behalf of the producer
    pub async fn abort(&self, stream_id: &str, reason: &str) -> Result<UploadResult> {
        let handle = {
            let slot = self.slot(stream_id)?;
            let mut slot = slot.lock().await;
            if !slot.closed {
                slot.closed = true;
                slot.last_activity = Instant::now();
                slot.handle
                    .send(StreamEvent::Error(reason.to_string()))
                    .await;
            }
            slot.handle.clone()
        };

        Ok(handle.result().await)
    }

    pub fn open_streams(&self) -> usize {
        self.streams().len()
    }

    /// Fail idle streams and forget finished ones past retention.
    ///
    /// Returns the number of streams removed.
    pub async fn reap(&self) -> usize {
        let now = Instant::now();
        let slots: Vec<(StreamId, SharedSlot)> = self
            .streams()
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();

        let mut expired = Vec::new();
        for (stream_id, slot) in slots {
            // A call is in progress on this stream
            let Ok(mut guard) = slot.try_lock() else {
                continue;
            };
            let idle = now.saturating_duration_since(guard.last_activity);

            if guard.handle.is_finished() {
                if idle >= self.config.result_retention {
                    expired.push(stream_id);
                }
            } else if !guard.closed && idle >= self.config.idle_timeout {
                warn!(
                    stream_id = %stream_id,
                    idle_ms = idle.as_millis() as u64,
                    "Upload stream idle, failing it"
                );
                guard.closed = true;
                guard.last_activity = now;
                guard
                    .handle
                    .send(StreamEvent::Error(IDLE_TIMEOUT_CAUSE.to_string()))
                    .await;
            }
        }

        if !expired.is_empty() {
            let mut streams = self.streams();
            for stream_id in &expired {
                streams.remove(stream_id);
            }
            debug!(removed = expired.len(), "Finished upload streams forgotten");
        }
        expired.len()
    }

    /// Periodic reaping until shutdown
    pub async fn run_reaper(self: Arc<Self>, mut shutdown: ShutdownToken) {
        let mut ticker = tokio::time::interval(self.config.reap_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reap().await;
                }
                _ = shutdown.wait() => {
                    debug!("Stream reaper stopped");
                    break;
                }
            }
        }
    }
}
