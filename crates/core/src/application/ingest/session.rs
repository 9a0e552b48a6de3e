// Ingest Session - per-stream state machine
//
// INIT -> ADMITTING -> {REJECTED | ADMITTED} -> RUNNING -> {COMPLETED | FAILED} -> RESPONDED
//
// Stream events, the job start signal, the job outcome and the admission-wait timer
// all race towards RESPONDED. Every handler is synchronous and constant-time; the
// only suspension is in `run`, waiting for the next of those wakeups.

use super::upload_job::{chunk_feed, FeedItem, FeedSender, UploadJob};
use crate::application::queue::{Admission, BoundedQueue, JobOutcome};
use crate::domain::upload::MSG_NO_METADATA;
use crate::domain::{DestinationName, StreamEvent, StreamId, UploadMessage, UploadMeta, UploadResult};
use crate::port::{StorageWriter, StoredFile};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Admitting,
    Rejected,
    Admitted,
    Running,
    Completed,
    Failed,
    Responded,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "INIT",
            SessionState::Admitting => "ADMITTING",
            SessionState::Rejected => "REJECTED",
            SessionState::Admitted => "ADMITTED",
            SessionState::Running => "RUNNING",
            SessionState::Completed => "COMPLETED",
            SessionState::Failed => "FAILED",
            SessionState::Responded => "RESPONDED",
        };
        f.write_str(name)
    }
}

enum Wake {
    Event(Option<StreamEvent>),
    Started(bool),
    Outcome(Result<JobOutcome<StoredFile>, oneshot::error::RecvError>),
    AdmissionTimeout,
}

/// One inbound upload stream.
///
/// Response contract: a successful upload is answered only after its sink has
/// finished, so `stored_path` in the response names a durable file. If the stream
/// ends while the job is still waiting for a worker, the session waits at most
/// `admission_wait` for the job to start; past that it hands every buffered byte to
/// the job, answers with the last known `accepted` value and no `stored_path`, and
/// lets the job write in the background.
pub struct IngestSession {
    stream_id: StreamId,
    queue: BoundedQueue<UploadJob>,
    writer: Arc<dyn StorageWriter>,
    admission_wait: Duration,

    state: SessionState,
    meta: Option<UploadMeta>,
    destination: Option<DestinationName>,
    accepted: bool,
    buffered: Vec<Bytes>,
    buffered_bytes: usize,
    job_started: bool,
    stream_ended: bool,

    feed: Option<FeedSender>,
    started: Option<oneshot::Receiver<()>>,
    outcome: Option<oneshot::Receiver<JobOutcome<StoredFile>>>,
    start_deadline: Option<Instant>,
    response: Option<UploadResult>,
}

impl IngestSession {
    pub fn new(
        stream_id: impl Into<StreamId>,
        queue: BoundedQueue<UploadJob>,
        writer: Arc<dyn StorageWriter>,
        admission_wait: Duration,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            queue,
            writer,
            admission_wait,
            state: SessionState::Init,
            meta: None,
            destination: None,
            accepted: false,
            buffered: Vec::new(),
            buffered_bytes: 0,
            job_started: false,
            stream_ended: false,
            feed: None,
            started: None,
            outcome: None,
            start_deadline: None,
            response: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn destination(&self) -> Option<&DestinationName> {
        self.destination.as_ref()
    }

    pub fn response(&self) -> Option<&UploadResult> {
        self.response.as_ref()
    }

    fn is_responded(&self) -> bool {
        self.response.is_some()
    }

    /// Drive the session until its terminal response
    pub async fn run(mut self, mut events: mpsc::Receiver<StreamEvent>) -> UploadResult {
        debug!(stream_id = %self.stream_id, "Session opened");

        loop {
            if let Some(response) = &self.response {
                return response.clone();
            }

            let wake = tokio::select! {
                biased;
                started = wait_signal(&mut self.started) => Wake::Started(started.is_ok()),
                event = events.recv(), if !self.stream_ended => Wake::Event(event),
                outcome = wait_signal(&mut self.outcome) => Wake::Outcome(outcome),
                _ = wait_deadline(self.start_deadline) => Wake::AdmissionTimeout,
            };

            match wake {
                Wake::Event(Some(event)) => self.on_event(event),
                Wake::Event(None) => self.on_transport_error("stream closed without end-of-stream"),
                Wake::Started(true) => self.on_job_started(),
                Wake::Started(false) => self.on_job_dropped(),
                Wake::Outcome(outcome) => self.on_job_outcome(outcome),
                Wake::AdmissionTimeout => self.on_admission_timeout(),
            }
        }
    }

    fn on_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Message(UploadMessage::Meta(meta)) => self.on_metadata(meta),
            StreamEvent::Message(UploadMessage::Data(chunk)) => self.on_data(chunk),
            StreamEvent::End => self.on_stream_end(),
            StreamEvent::Error(cause) => self.on_transport_error(&cause),
        }
    }

    fn on_metadata(&mut self, meta: UploadMeta) {
        if self.meta.is_some() {
            debug!(
                stream_id = %self.stream_id,
                filename = %meta.filename,
                "Duplicate metadata ignored"
            );
            return;
        }
        if self.is_responded() {
            return;
        }

        info!(
            stream_id = %self.stream_id,
            filename = %meta.filename,
            content_type = %meta.content_type,
            size_bytes = meta.size_bytes,
            source_id = %meta.source_id,
            "Metadata received"
        );
        let filename = meta.filename.clone();
        self.meta = Some(meta);
        self.transition(SessionState::Admitting);

        let destination = match DestinationName::sanitize(&filename) {
            Ok(destination) => destination,
            Err(e) => {
                warn!(stream_id = %self.stream_id, filename = %filename, error = %e, "Invalid filename");
                self.accepted = false;
                self.discard_buffer();
                self.transition(SessionState::Rejected);
                self.respond(UploadResult::rejected(format!("Invalid filename: {e}")));
                return;
            }
        };

        let (feed_tx, feed_rx) = chunk_feed();
        let job = UploadJob::new(
            self.stream_id.clone(),
            destination.clone(),
            Arc::clone(&self.writer),
            feed_rx,
        );

        match self.queue.try_enqueue(job) {
            Admission::Accepted(ticket) => {
                debug!(stream_id = %self.stream_id, job_id = %ticket.job_id, "Upload admitted");
                self.accepted = true;
                self.destination = Some(destination);
                self.feed = Some(feed_tx);
                self.started = Some(ticket.started);
                self.outcome = Some(ticket.outcome);
                self.transition(SessionState::Admitted);
            }
            Admission::Rejected(_) => {
                self.accepted = false;
                self.discard_buffer();
                self.transition(SessionState::Rejected);
                self.respond(UploadResult::queue_full());
            }
        }
    }

    fn on_data(&mut self, chunk: Bytes) {
        if self.is_responded() || self.state == SessionState::Rejected {
            return;
        }
        if self.job_started {
            self.forward(FeedItem::Chunk(chunk));
        } else {
            self.buffered_bytes += chunk.len();
            self.buffered.push(chunk);
        }
    }

    fn on_job_started(&mut self) {
        self.started = None;
        self.job_started = true;
        if self.is_responded() {
            return;
        }
        self.transition(SessionState::Running);

        let chunks = std::mem::take(&mut self.buffered);
        info!(
            stream_id = %self.stream_id,
            buffered_chunks = chunks.len(),
            buffered_bytes = self.buffered_bytes,
            "Job started, flushing buffered chunks"
        );
        self.buffered_bytes = 0;
        for chunk in chunks {
            self.forward(FeedItem::Chunk(chunk));
        }

        if self.stream_ended {
            self.start_deadline = None;
            self.close_feed(FeedItem::End);
        }
    }

    fn on_stream_end(&mut self) {
        if self.stream_ended {
            return;
        }
        self.stream_ended = true;
        if self.is_responded() {
            return;
        }

        debug!(
            stream_id = %self.stream_id,
            job_started = self.job_started,
            "All data received"
        );

        if self.meta.is_none() {
            self.accepted = false;
            self.discard_buffer();
            self.respond(UploadResult::rejected(MSG_NO_METADATA));
        } else if self.job_started {
            self.close_feed(FeedItem::End);
        } else {
            self.start_deadline = Some(Instant::now() + self.admission_wait);
            debug!(
                stream_id = %self.stream_id,
                wait_ms = self.admission_wait.as_millis() as u64,
                "Waiting for job start"
            );
        }
    }

    fn on_admission_timeout(&mut self) {
        self.start_deadline = None;
        if self.job_started || self.is_responded() {
            return;
        }

        let chunks = std::mem::take(&mut self.buffered);
        warn!(
            stream_id = %self.stream_id,
            wait_ms = self.admission_wait.as_millis() as u64,
            buffered_chunks = chunks.len(),
            buffered_bytes = self.buffered_bytes,
            "Job did not start within the admission wait, responding before durability"
        );
        self.buffered_bytes = 0;
        // The job drains these when it eventually gets a worker
        for chunk in chunks {
            self.forward(FeedItem::Chunk(chunk));
        }
        self.close_feed(FeedItem::End);

        self.respond(UploadResult::admission_timeout(self.accepted));
    }

    fn on_transport_error(&mut self, cause: &str) {
        if self.is_responded() {
            return;
        }
        warn!(stream_id = %self.stream_id, cause = %cause, "Upload stream failed");

        self.discard_buffer();
        if self.feed.is_some() {
            self.close_feed(FeedItem::Abort);
        }
        self.start_deadline = None;
        self.accepted = false;
        self.transition(SessionState::Failed);
        self.respond(UploadResult::stream_error(cause));
    }

    fn on_job_outcome(
        &mut self,
        outcome: Result<JobOutcome<StoredFile>, oneshot::error::RecvError>,
    ) {
        self.outcome = None;
        if self.is_responded() {
            return;
        }

        match outcome {
            Ok(Ok(stored)) => {
                self.transition(SessionState::Completed);
                self.respond(UploadResult::completed(stored.name));
            }
            Ok(Err(e)) => {
                error!(stream_id = %self.stream_id, error = %e, "Upload job failed");
                self.feed = None;
                self.accepted = false;
                self.transition(SessionState::Failed);
                self.respond(UploadResult::storage_failed(e));
            }
            Err(_) => self.on_job_dropped(),
        }
    }

    fn on_job_dropped(&mut self) {
        self.started = None;
        self.outcome = None;
        if self.is_responded() {
            return;
        }
        error!(stream_id = %self.stream_id, "Upload job dropped by the queue");
        self.feed = None;
        self.accepted = false;
        self.transition(SessionState::Failed);
        self.respond(UploadResult::rejected(
            "Upload job was dropped before completing",
        ));
    }

    fn forward(&mut self, item: FeedItem) {
        if let Some(feed) = &self.feed {
            if feed.send(item).is_err() {
                debug!(stream_id = %self.stream_id, "Job no longer reading its feed");
                self.feed = None;
            }
        }
    }

    fn close_feed(&mut self, last: FeedItem) {
        self.forward(last);
        self.feed = None;
    }

    fn discard_buffer(&mut self) {
        if !self.buffered.is_empty() {
            debug!(
                stream_id = %self.stream_id,
                buffered_chunks = self.buffered.len(),
                buffered_bytes = self.buffered_bytes,
                "Discarding buffered chunks"
            );
        }
        self.buffered.clear();
        self.buffered_bytes = 0;
    }

    fn transition(&mut self, next: SessionState) {
        debug!(stream_id = %self.stream_id, from = %self.state, to = %next, "Session transition");
        self.state = next;
    }

    /// Record the terminal response; later attempts are no-ops
    fn respond(&mut self, result: UploadResult) {
        if self.response.is_some() {
            debug!(
                stream_id = %self.stream_id,
                ignored = %result.message,
                "Terminal response already recorded"
            );
            return;
        }

        info!(
            stream_id = %self.stream_id,
            accepted = result.accepted,
            message = %result.message,
            stored_path = ?result.stored_path,
            "Upload responded"
        );
        self.transition(SessionState::Responded);
        self.response = Some(result);
    }
}

async fn wait_signal<T>(
    rx: &mut Option<oneshot::Receiver<T>>,
) -> Result<T, oneshot::error::RecvError> {
    match rx {
        Some(rx) => rx.await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::queue::QueueConfig;
    use crate::domain::upload::{MSG_ADMISSION_TIMEOUT, MSG_QUEUE_FULL};
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::storage_writer::mocks::{MemoryStorageWriter, MockBehavior};
    use tokio::task::JoinHandle;

    const LONG_WAIT: Duration = Duration::from_secs(5);

    fn upload_queue(max_pending: usize, concurrency: usize) -> BoundedQueue<UploadJob> {
        BoundedQueue::new(
            QueueConfig::new(max_pending, concurrency).unwrap(),
            Arc::new(SequentialIdProvider::new("job")),
        )
    }

    fn spawn_session(
        id: &str,
        queue: &BoundedQueue<UploadJob>,
        writer: &MemoryStorageWriter,
        admission_wait: Duration,
    ) -> (mpsc::Sender<StreamEvent>, JoinHandle<UploadResult>) {
        let (tx, rx) = mpsc::channel(64);
        let session = IngestSession::new(id, queue.clone(), Arc::new(writer.clone()), admission_wait);
        (tx, tokio::spawn(session.run(rx)))
    }

    fn meta(filename: &str) -> StreamEvent {
        StreamEvent::Message(UploadMessage::Meta(UploadMeta {
            filename: filename.to_string(),
            content_type: "video/mp4".to_string(),
            size_bytes: 0,
            source_id: "producer-1".to_string(),
        }))
    }

    fn data(bytes: &[u8]) -> StreamEvent {
        StreamEvent::Message(UploadMessage::Data(Bytes::copy_from_slice(bytes)))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// Session whose job holds the only worker until `tx` sends End
    async fn occupy_worker(
        queue: &BoundedQueue<UploadJob>,
        writer: &MemoryStorageWriter,
    ) -> (mpsc::Sender<StreamEvent>, JoinHandle<UploadResult>) {
        let (tx, handle) = spawn_session("blocker", queue, writer, LONG_WAIT);
        tx.send(meta("blocker.mp4")).await.unwrap();
        let q = queue.clone();
        wait_until(move || q.stats().active == 1).await;
        (tx, handle)
    }

    #[tokio::test]
    async fn test_upload_is_stored_and_reported() {
        let queue = upload_queue(4, 2);
        let writer = MemoryStorageWriter::new_success();
        let (tx, handle) = spawn_session("s1", &queue, &writer, LONG_WAIT);

        tx.send(meta("clip.mp4")).await.unwrap();
        tx.send(data(b"hello ")).await.unwrap();
        tx.send(data(b"world")).await.unwrap();
        tx.send(StreamEvent::End).await.unwrap();

        let result = handle.await.unwrap();
        assert!(result.accepted);
        assert_eq!(result.stored_path.as_deref(), Some("clip.mp4"));
        assert_eq!(writer.file("clip.mp4").unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_slow_start_keeps_all_buffered_bytes_in_order() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new_success();
        let (blocker_tx, blocker) = occupy_worker(&queue, &writer).await;

        let chunks = [vec![1u8; 10], vec![2u8; 20], vec![3u8; 30]];
        let (tx, handle) = spawn_session("s2", &queue, &writer, LONG_WAIT);
        tx.send(meta("slow.mp4")).await.unwrap();
        for chunk in &chunks {
            tx.send(data(chunk)).await.unwrap();
        }
        tx.send(StreamEvent::End).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished(), "must wait for its job to run");

        blocker_tx.send(StreamEvent::End).await.unwrap();
        assert!(blocker.await.unwrap().accepted);

        let result = handle.await.unwrap();
        assert!(result.accepted);
        assert_eq!(result.stored_path.as_deref(), Some("slow.mp4"));
        let stored = writer.file("slow.mp4").unwrap();
        assert_eq!(stored.len(), 60);
        assert_eq!(stored, chunks.concat());
    }

    #[tokio::test]
    async fn test_buffered_bytes_precede_live_bytes() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new_success();
        let (blocker_tx, blocker) = occupy_worker(&queue, &writer).await;

        let (tx, handle) = spawn_session("s3", &queue, &writer, LONG_WAIT);
        tx.send(meta("mixed.mp4")).await.unwrap();
        tx.send(data(b"AA")).await.unwrap();
        tx.send(data(b"BB")).await.unwrap();

        // Free the worker and wait for the second job to be running
        blocker_tx.send(StreamEvent::End).await.unwrap();
        blocker.await.unwrap();
        let q = queue.clone();
        wait_until(move || {
            let stats = q.stats();
            stats.succeeded == 1 && stats.active == 1
        })
        .await;

        tx.send(data(b"CC")).await.unwrap();
        tx.send(data(b"DD")).await.unwrap();
        tx.send(StreamEvent::End).await.unwrap();

        let result = handle.await.unwrap();
        assert!(result.accepted);
        assert_eq!(writer.file("mixed.mp4").unwrap(), b"AABBCCDD");
    }

    #[tokio::test]
    async fn test_duplicate_metadata_is_ignored() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new_success();
        let (tx, handle) = spawn_session("s4", &queue, &writer, LONG_WAIT);

        tx.send(meta("first.mp4")).await.unwrap();
        tx.send(data(b"x")).await.unwrap();
        tx.send(meta("second.mp4")).await.unwrap();
        tx.send(StreamEvent::End).await.unwrap();

        let result = handle.await.unwrap();
        assert_eq!(result.stored_path.as_deref(), Some("first.mp4"));
        assert_eq!(writer.file_names(), vec!["first.mp4"]);
        assert_eq!(queue.stats().admitted, 1);
    }

    #[tokio::test]
    async fn test_queue_full_rejects_without_opening_writer() {
        let queue = upload_queue(0, 1);
        let writer = MemoryStorageWriter::new_success();
        let (tx, handle) = spawn_session("s5", &queue, &writer, LONG_WAIT);

        tx.send(meta("dropped.mp4")).await.unwrap();
        // Session may already be gone; late data is discarded either way
        let _ = tx.send(data(b"ignored")).await;
        let _ = tx.send(StreamEvent::End).await;

        let result = handle.await.unwrap();
        assert!(!result.accepted);
        assert_eq!(result.message, MSG_QUEUE_FULL);
        assert!(result.stored_path.is_none());
        assert_eq!(writer.open_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_filename_is_rejected() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new_success();
        let (tx, handle) = spawn_session("s6", &queue, &writer, LONG_WAIT);

        tx.send(meta("videos/..")).await.unwrap();

        let result = handle.await.unwrap();
        assert!(!result.accepted);
        assert!(result.message.starts_with("Invalid filename"));
        assert_eq!(queue.stats().admitted, 0);
    }

    #[tokio::test]
    async fn test_end_without_metadata() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new_success();
        let (tx, handle) = spawn_session("s7", &queue, &writer, LONG_WAIT);

        tx.send(data(b"orphan")).await.unwrap();
        tx.send(StreamEvent::End).await.unwrap();

        let result = handle.await.unwrap();
        assert!(!result.accepted);
        assert_eq!(result.message, MSG_NO_METADATA);
        assert_eq!(writer.open_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_before_start_never_touches_storage() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new_success();
        let (blocker_tx, blocker) = occupy_worker(&queue, &writer).await;

        let (tx, handle) = spawn_session("s8", &queue, &writer, LONG_WAIT);
        tx.send(meta("broken.mp4")).await.unwrap();
        tx.send(data(b"partial")).await.unwrap();
        tx.send(StreamEvent::Error("connection reset".to_string()))
            .await
            .unwrap();

        let result = handle.await.unwrap();
        assert!(!result.accepted);
        assert_eq!(result.message, "Stream error: connection reset");

        blocker_tx.send(StreamEvent::End).await.unwrap();
        blocker.await.unwrap();
        queue.wait_idle().await;

        assert!(writer.file("broken.mp4").is_none());
        assert_eq!(writer.open_count(), 1, "only the blocker opened a sink");
        assert_eq!(queue.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_dropped_channel_counts_as_transport_error() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new_success();
        let (tx, handle) = spawn_session("s9", &queue, &writer, LONG_WAIT);

        tx.send(meta("gone.mp4")).await.unwrap();
        drop(tx);

        let result = handle.await.unwrap();
        assert!(!result.accepted);
        assert!(result.message.starts_with("Stream error"));
    }

    #[tokio::test]
    async fn test_admission_timeout_responds_and_keeps_bytes() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new_success();
        let (blocker_tx, blocker) = occupy_worker(&queue, &writer).await;

        let (tx, handle) = spawn_session("s10", &queue, &writer, Duration::from_millis(30));
        tx.send(meta("late.mp4")).await.unwrap();
        tx.send(data(b"late ")).await.unwrap();
        tx.send(data(b"bytes")).await.unwrap();
        tx.send(StreamEvent::End).await.unwrap();

        let result = handle.await.unwrap();
        assert!(result.accepted, "last known admission state is reported");
        assert_eq!(result.message, MSG_ADMISSION_TIMEOUT);
        assert!(result.stored_path.is_none());

        blocker_tx.send(StreamEvent::End).await.unwrap();
        blocker.await.unwrap();
        queue.wait_idle().await;
        assert_eq!(writer.file("late.mp4").unwrap(), b"late bytes");
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new(MockBehavior::FailFinish("fsync failed".to_string()));
        let (tx, handle) = spawn_session("s11", &queue, &writer, LONG_WAIT);

        tx.send(meta("doomed.mp4")).await.unwrap();
        tx.send(data(b"abc")).await.unwrap();
        tx.send(StreamEvent::End).await.unwrap();

        let result = handle.await.unwrap();
        assert!(!result.accepted);
        assert!(result.message.contains("Storage write failed"));
        assert!(result.message.contains("fsync failed"));
        assert!(result.stored_path.is_none());
    }

    #[tokio::test]
    async fn test_sink_open_failure_is_reported() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new(MockBehavior::FailOpen("permission denied".to_string()));
        let (tx, handle) = spawn_session("s12", &queue, &writer, LONG_WAIT);

        tx.send(meta("locked.mp4")).await.unwrap();
        tx.send(data(b"abc")).await.unwrap();
        tx.send(StreamEvent::End).await.unwrap();

        let result = handle.await.unwrap();
        assert!(!result.accepted);
        assert!(result.message.starts_with("Storage write failed"));
        assert!(result.message.contains("permission denied"));
        assert!(result.stored_path.is_none());
        assert_eq!(writer.open_count(), 1);
        assert_eq!(queue.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_taken_destination_is_reported_as_storage_failure() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new_success();

        let (tx, first) = spawn_session("s13", &queue, &writer, LONG_WAIT);
        tx.send(meta("same.mp4")).await.unwrap();
        tx.send(StreamEvent::End).await.unwrap();
        assert!(first.await.unwrap().accepted);

        let (tx, second) = spawn_session("s14", &queue, &writer, LONG_WAIT);
        tx.send(meta("same.mp4")).await.unwrap();
        tx.send(data(b"other")).await.unwrap();
        tx.send(StreamEvent::End).await.unwrap();

        let result = second.await.unwrap();
        assert!(!result.accepted);
        assert!(result.message.contains("already exists"));
        assert_eq!(writer.file("same.mp4").unwrap(), b"");
    }

    #[tokio::test]
    async fn test_response_waits_for_durable_finish() {
        let queue = upload_queue(4, 1);
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let writer = MemoryStorageWriter::new_success().with_finish_gate(Arc::clone(&gate));
        let (tx, handle) = spawn_session("s15", &queue, &writer, LONG_WAIT);

        tx.send(meta("slow-disk.mp4")).await.unwrap();
        tx.send(data(b"payload")).await.unwrap();
        tx.send(StreamEvent::End).await.unwrap();

        let q = queue.clone();
        wait_until(move || q.stats().active == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished(), "no response before the sink finishes");
        assert!(writer
            .file("slow-disk.mp4")
            .map_or(true, |bytes| bytes.is_empty()));

        gate.add_permits(1);
        let result = handle.await.unwrap();
        assert!(result.accepted);
        assert_eq!(writer.file("slow-disk.mp4").unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_terminal_response_is_recorded_once() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new_success();
        let (_blocker_tx, _blocker) = occupy_worker(&queue, &writer).await;

        // Timeout first, then every other path tries to respond
        let mut session =
            IngestSession::new("race-1", queue.clone(), Arc::new(writer.clone()), LONG_WAIT);
        session.on_event(meta("race.mp4"));
        session.on_data(Bytes::from_static(b"x"));
        session.on_stream_end();
        session.on_admission_timeout();
        let first = session.response().cloned().unwrap();
        assert_eq!(first.message, MSG_ADMISSION_TIMEOUT);

        session.on_transport_error("late failure");
        session.on_job_started();
        session.on_job_outcome(Ok(Ok(StoredFile {
            name: "race.mp4".to_string(),
            path: "memory://race.mp4".into(),
            size_bytes: 1,
        })));
        session.on_job_dropped();
        assert_eq!(session.response(), Some(&first));
        assert_eq!(session.state(), SessionState::Responded);

        // Transport error first, then stream end and timer
        let mut session =
            IngestSession::new("race-2", queue.clone(), Arc::new(writer.clone()), LONG_WAIT);
        session.on_event(meta("race2.mp4"));
        session.on_transport_error("reset");
        let first = session.response().cloned().unwrap();
        session.on_stream_end();
        session.on_admission_timeout();
        session.on_job_started();
        assert_eq!(session.response(), Some(&first));
        assert_eq!(first.message, "Stream error: reset");
    }

    #[tokio::test]
    async fn test_session_states_follow_admission() {
        let queue = upload_queue(4, 1);
        let writer = MemoryStorageWriter::new_success();
        let (_blocker_tx, _blocker) = occupy_worker(&queue, &writer).await;

        let mut session =
            IngestSession::new("states", queue.clone(), Arc::new(writer.clone()), LONG_WAIT);
        assert_eq!(session.state(), SessionState::Init);

        session.on_event(meta("../../etc/x.mp4"));
        assert_eq!(session.state(), SessionState::Admitted);
        assert_eq!(session.destination().unwrap().as_str(), "x.mp4");

        session.on_event(meta("other.mp4"));
        assert_eq!(session.destination().unwrap().as_str(), "x.mp4");

        session.on_job_started();
        assert_eq!(session.state(), SessionState::Running);
    }
}
