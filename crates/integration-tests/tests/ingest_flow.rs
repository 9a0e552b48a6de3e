//! End-to-end ingest against the filesystem adapter
//!
//! Sessions, the bounded queue and FsStorageWriter wired as the daemon wires them.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clipdock_core::application::{
    BoundedQueue, CapacityMode, IngestConfig, IngestService, ListingService, QueueConfig,
    SessionHandle,
};
use clipdock_core::domain::upload::MSG_QUEUE_FULL;
use clipdock_core::domain::{StreamEvent, UploadMessage, UploadMeta};
use clipdock_core::port::id_provider::SequentialIdProvider;
use clipdock_infra_fs::{CollisionPolicy, FsMediaCatalog, FsStorageWriter};
use tempfile::TempDir;

async fn ingest(dir: &TempDir, queue_config: QueueConfig) -> IngestService {
    let writer = FsStorageWriter::new(dir.path(), CollisionPolicy::Uniquify)
        .await
        .unwrap();
    let queue = BoundedQueue::new(queue_config, Arc::new(SequentialIdProvider::new("job")));
    IngestService::new(queue, Arc::new(writer), IngestConfig::default())
}

fn meta(filename: &str) -> StreamEvent {
    StreamEvent::Message(UploadMessage::Meta(UploadMeta {
        filename: filename.to_string(),
        content_type: "video/mp4".to_string(),
        size_bytes: 0,
        source_id: "it".to_string(),
    }))
}

fn data(bytes: Vec<u8>) -> StreamEvent {
    StreamEvent::Message(UploadMessage::Data(Bytes::from(bytes)))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Session holding a worker (metadata sent, no end yet)
async fn start_holding(service: &IngestService, id: &str, filename: &str) -> SessionHandle {
    let handle = service.open_session(id);
    assert!(handle.send(meta(filename)).await);
    handle
}

async fn upload(service: &IngestService, id: &str, filename: &str, bytes: Vec<u8>) -> SessionHandle {
    let handle = service.open_session(id);
    handle.send(meta(filename)).await;
    handle.send(data(bytes)).await;
    handle.send(StreamEvent::End).await;
    handle
}

#[tokio::test]
async fn test_full_queue_sheds_and_never_writes() {
    let dir = TempDir::new().unwrap();
    let service = ingest(&dir, QueueConfig::new(1, 1).unwrap()).await;
    let queue = service.queue().clone();

    let running = start_holding(&service, "s-running", "running.mp4").await;
    let q = queue.clone();
    wait_until(move || q.stats().active == 1).await;

    let waiting = start_holding(&service, "s-waiting", "waiting.mp4").await;
    let q = queue.clone();
    wait_until(move || q.stats().pending == 1).await;

    let shed = upload(&service, "s-shed", "shed.mp4", vec![1; 10]).await;
    let shed_result = shed.result().await;
    assert!(!shed_result.accepted);
    assert_eq!(shed_result.message, MSG_QUEUE_FULL);

    running.send(StreamEvent::End).await;
    waiting.send(StreamEvent::End).await;
    assert!(running.result().await.accepted);
    assert!(waiting.result().await.accepted);
    queue.wait_idle().await;

    assert!(dir.path().join("running.mp4").exists());
    assert!(dir.path().join("waiting.mp4").exists());
    assert!(!dir.path().join("shed.mp4").exists());

    let stats = queue.stats();
    assert_eq!(stats.admitted, 2);
    assert_eq!(stats.rejected, 1);
}

#[tokio::test]
async fn test_in_flight_mode_caps_admitted_uploads() {
    let dir = TempDir::new().unwrap();
    let config = QueueConfig::new(2, 2)
        .unwrap()
        .with_capacity_mode(CapacityMode::InFlight);
    let service = ingest(&dir, config).await;

    // Five uploads open at once; none has ended
    let mut handles = Vec::new();
    for i in 0..5 {
        handles.push(start_holding(&service, &format!("s-{i}"), &format!("clip{i}.mp4")).await);
    }
    let q = service.queue().clone();
    wait_until(move || q.stats().rejected == 3).await;

    for handle in &handles {
        handle.send(StreamEvent::End).await;
    }
    let mut accepted = 0;
    for handle in &handles {
        if handle.result().await.accepted {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 2);
    assert_eq!(service.queue().stats().admitted, 2);
}

#[tokio::test]
async fn test_same_name_uploads_are_both_stored() {
    let dir = TempDir::new().unwrap();
    let service = ingest(&dir, QueueConfig::new(4, 2).unwrap()).await;

    let first = start_holding(&service, "s-1", "dup.mp4").await;
    let second = start_holding(&service, "s-2", "dup.mp4").await;
    let q = service.queue().clone();
    wait_until(move || q.stats().active == 2).await;

    first.send(data(vec![b'a'; 1000])).await;
    second.send(data(vec![b'b'; 2000])).await;
    first.send(StreamEvent::End).await;
    second.send(StreamEvent::End).await;

    let a = first.result().await;
    let b = second.result().await;
    assert!(a.accepted && b.accepted);
    assert_ne!(a.stored_path, b.stored_path);

    let mut stored = vec![
        std::fs::read(dir.path().join("dup.mp4")).unwrap(),
        std::fs::read(dir.path().join("dup-1.mp4")).unwrap(),
    ];
    stored.sort_by_key(|bytes| bytes.len());
    assert_eq!(stored[0], vec![b'a'; 1000]);
    assert_eq!(stored[1], vec![b'b'; 2000]);
}

#[tokio::test]
async fn test_slow_start_upload_is_complete_on_disk() {
    let dir = TempDir::new().unwrap();
    let service = ingest(&dir, QueueConfig::new(4, 1).unwrap()).await;

    let blocker = start_holding(&service, "s-blocker", "blocker.mp4").await;
    let q = service.queue().clone();
    wait_until(move || q.stats().active == 1).await;

    let slow = service.open_session("s-slow");
    slow.send(meta("slow.mp4")).await;
    slow.send(data(vec![1; 10])).await;
    slow.send(data(vec![2; 20])).await;
    slow.send(data(vec![3; 30])).await;
    slow.send(StreamEvent::End).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(slow.try_result().is_none());

    blocker.send(StreamEvent::End).await;
    let result = slow.result().await;
    assert!(result.accepted);
    assert_eq!(result.stored_path.as_deref(), Some("slow.mp4"));

    let bytes = std::fs::read(dir.path().join("slow.mp4")).unwrap();
    let expected: Vec<u8> = [vec![1; 10], vec![2; 20], vec![3; 30]].concat();
    assert_eq!(bytes, expected);
}

#[tokio::test]
async fn test_listing_shows_only_stored_videos() {
    let dir = TempDir::new().unwrap();
    let service = ingest(&dir, QueueConfig::new(4, 2).unwrap()).await;

    let a = upload(&service, "s-a", "a.mp4", vec![0; 100]).await;
    let b = upload(&service, "s-b", "b.webm", vec![0; 200]).await;
    assert!(a.result().await.accepted);
    assert!(b.result().await.accepted);
    std::fs::write(dir.path().join("c.txt"), b"not a video").unwrap();

    let listing = ListingService::new(Arc::new(FsMediaCatalog::new(dir.path())));
    let items = listing.list().await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].filename, "a.mp4");
    assert_eq!(items[0].size_bytes, 100);
    assert_eq!(items[0].url, "/media/a.mp4");
    assert_eq!(items[1].filename, "b.webm");
    assert_eq!(items[1].size_bytes, 200);
    assert_eq!(items[1].content_type, "video/webm");
}

#[tokio::test]
async fn test_traversal_filename_lands_in_root() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("media");
    let writer = FsStorageWriter::new(&root, CollisionPolicy::Uniquify)
        .await
        .unwrap();
    let queue = BoundedQueue::new(
        QueueConfig::new(4, 1).unwrap(),
        Arc::new(SequentialIdProvider::new("job")),
    );
    let service = IngestService::new(queue, Arc::new(writer), IngestConfig::default());

    let handle = upload(&service, "s-evil", "../../escape.mp4", vec![7; 5]).await;
    let result = handle.result().await;
    assert!(result.accepted);
    assert_eq!(result.stored_path.as_deref(), Some("escape.mp4"));
    assert!(root.join("escape.mp4").exists());
    assert!(!dir.path().join("escape.mp4").exists());
}
