// Upload Job - writes one session's bytes into a storage sink

use crate::application::queue::{JobError, QueueJob};
use crate::domain::DestinationName;
use crate::port::{StorageWriter, StoredFile};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

/// Items flowing from a session to its job, in stream order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    Chunk(Bytes),
    /// All data delivered: finish the sink
    End,
    /// The stream failed: stop writing
    Abort,
}

pub type FeedSender = mpsc::UnboundedSender<FeedItem>;
pub type FeedReceiver = mpsc::UnboundedReceiver<FeedItem>;

/// Unbounded so that the session never waits on storage speed
pub fn chunk_feed() -> (FeedSender, FeedReceiver) {
    mpsc::unbounded_channel()
}

/// Deferred write of one upload
pub struct UploadJob {
    stream_id: String,
    destination: DestinationName,
    writer: Arc<dyn StorageWriter>,
    feed: FeedReceiver,
}

impl UploadJob {
    pub fn new(
        stream_id: impl Into<String>,
        destination: DestinationName,
        writer: Arc<dyn StorageWriter>,
        feed: FeedReceiver,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            destination,
            writer,
            feed,
        }
    }
}

#[async_trait]
impl QueueJob for UploadJob {
    type Output = StoredFile;

    fn describe(&self) -> String {
        format!("upload:{}:{}", self.stream_id, self.destination)
    }

    /// Open the sink, write the feed in order, finish on end-of-stream.
    ///
    /// A stream that failed before the job got a worker never touches storage.
    /// A stream that fails mid-write is not rolled back: the sink is finished with
    /// what arrived and the job reports `StreamAborted`.
    async fn run(mut self) -> Result<StoredFile, JobError> {
        let mut next = match self.feed.try_recv() {
            Ok(FeedItem::Abort) | Err(TryRecvError::Disconnected) => {
                info!(
                    stream_id = %self.stream_id,
                    destination = %self.destination,
                    "Stream failed before the write started, skipping storage"
                );
                return Err(JobError::StreamAborted { bytes_written: 0 });
            }
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) => None,
        };

        let mut sink = self.writer.open(&self.destination).await?;
        debug!(stream_id = %self.stream_id, destination = %self.destination, "Sink opened");

        let mut bytes_written: u64 = 0;
        loop {
            let item = match next.take() {
                Some(item) => Some(item),
                None => self.feed.recv().await,
            };

            match item {
                Some(FeedItem::Chunk(chunk)) => {
                    bytes_written += chunk.len() as u64;
                    sink.write(chunk).await?;
                }
                Some(FeedItem::End) => {
                    let stored = sink.finish().await?;
                    info!(
                        stream_id = %self.stream_id,
                        stored_name = %stored.name,
                        size_bytes = stored.size_bytes,
                        "Upload written"
                    );
                    return Ok(stored);
                }
                Some(FeedItem::Abort) | None => {
                    let partial = sink.finish().await?;
                    warn!(
                        stream_id = %self.stream_id,
                        stored_name = %partial.name,
                        bytes_written,
                        "Stream aborted mid-write, partial output kept"
                    );
                    return Err(JobError::StreamAborted { bytes_written });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::storage_writer::mocks::{MemoryStorageWriter, MockBehavior};
    use crate::port::StorageError;

    fn job(writer: &MemoryStorageWriter, name: &str) -> (FeedSender, UploadJob) {
        let (tx, rx) = chunk_feed();
        let destination = DestinationName::sanitize(name).unwrap();
        (
            tx,
            UploadJob::new("s-1", destination, Arc::new(writer.clone()), rx),
        )
    }

    #[tokio::test]
    async fn test_writes_feed_in_order_then_finishes() {
        let writer = MemoryStorageWriter::new_success();
        let (tx, job) = job(&writer, "clip.mp4");

        tx.send(FeedItem::Chunk(Bytes::from_static(b"abc"))).unwrap();
        tx.send(FeedItem::Chunk(Bytes::from_static(b"def"))).unwrap();
        tx.send(FeedItem::End).unwrap();

        let stored = job.run().await.unwrap();
        assert_eq!(stored.name, "clip.mp4");
        assert_eq!(stored.size_bytes, 6);
        assert_eq!(writer.file("clip.mp4").unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_live_chunks_after_start_are_written() {
        let writer = MemoryStorageWriter::new_success();
        let (tx, job) = job(&writer, "live.webm");

        let handle = tokio::spawn(job.run());
        tokio::task::yield_now().await;
        tx.send(FeedItem::Chunk(Bytes::from_static(b"12"))).unwrap();
        tx.send(FeedItem::Chunk(Bytes::from_static(b"34"))).unwrap();
        tx.send(FeedItem::End).unwrap();

        let stored = handle.await.unwrap().unwrap();
        assert_eq!(stored.size_bytes, 4);
        assert_eq!(writer.file("live.webm").unwrap(), b"1234");
    }

    #[tokio::test]
    async fn test_abort_before_start_skips_storage() {
        let writer = MemoryStorageWriter::new_success();
        let (tx, job) = job(&writer, "never.mp4");

        tx.send(FeedItem::Abort).unwrap();
        drop(tx);

        let result = job.run().await;
        assert!(matches!(
            result,
            Err(JobError::StreamAborted { bytes_written: 0 })
        ));
        assert_eq!(writer.open_count(), 0);
    }

    #[tokio::test]
    async fn test_feed_closed_mid_write_keeps_partial_output() {
        let writer = MemoryStorageWriter::new_success();
        let (tx, job) = job(&writer, "partial.mp4");

        tx.send(FeedItem::Chunk(Bytes::from_static(b"half"))).unwrap();
        drop(tx);

        let result = job.run().await;
        assert!(matches!(
            result,
            Err(JobError::StreamAborted { bytes_written: 4 })
        ));
        assert_eq!(writer.file("partial.mp4").unwrap(), b"half");
    }

    #[tokio::test]
    async fn test_sink_write_failure_is_reported() {
        let writer = MemoryStorageWriter::new(MockBehavior::FailWrite("disk full".to_string()));
        let (tx, job) = job(&writer, "fail.mp4");

        tx.send(FeedItem::Chunk(Bytes::from_static(b"x"))).unwrap();
        tx.send(FeedItem::End).unwrap();

        match job.run().await {
            Err(JobError::Storage(StorageError::Io(e))) => assert!(e.to_string().contains("disk full")),
            other => panic!("expected storage failure, got {:?}", other),
        }
    }
}
