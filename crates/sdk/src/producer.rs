//! Folder producer: uploads every video in a set of folders.
//!
//! Each producer task owns one folder and starts its uploads concurrently,
//! staggered by a fixed delay. With fewer folders than tasks, the extra tasks
//! reuse the last folder.

use crate::client::ClipdockClient;
use crate::error::Result;
use crate::types::UploadResult;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default number of producer tasks
pub const DEFAULT_PRODUCERS: usize = 2;

/// Default delay between upload starts within one producer (250ms)
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(250);

/// Must stay in sync with `clipdock_core::domain::media`; the daemon only lists these
const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
];

fn extension_lowercase(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Content type from the extension (case-insensitive)
pub fn content_type_for(filename: &str) -> &'static str {
    extension_lowercase(filename)
        .and_then(|ext| {
            VIDEO_TYPES
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, content_type)| *content_type)
        })
        .unwrap_or("application/octet-stream")
}

pub fn is_video_file(filename: &str) -> bool {
    extension_lowercase(filename)
        .map(|ext| VIDEO_TYPES.iter().any(|(known, _)| *known == ext))
        .unwrap_or(false)
}

/// Video files directly inside `folder`, sorted
pub async fn scan_videos(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(folder).await?;
    let mut videos = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let is_match = entry
            .file_name()
            .to_str()
            .map(is_video_file)
            .unwrap_or(false);
        if is_match && entry.file_type().await?.is_file() {
            videos.push(entry.path());
        }
    }
    videos.sort();
    Ok(videos)
}

/// Folder for each producer task (1-based index i gets `folders[i-1]` or the last one)
pub fn assign_folders(folders: &[PathBuf], producers: usize) -> Vec<PathBuf> {
    let Some(last) = folders.last() else {
        return Vec::new();
    };
    if folders.len() < producers {
        warn!(
            folders = folders.len(),
            producers, "Fewer folders than producers, reusing the last folder"
        );
    }
    (0..producers)
        .map(|i| folders.get(i).unwrap_or(last).clone())
        .collect()
}

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub folders: Vec<PathBuf>,
    pub producers: usize,
    pub stagger: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            producers: DEFAULT_PRODUCERS,
            stagger: DEFAULT_STAGGER,
        }
    }
}

/// Outcome of one file
#[derive(Debug)]
pub struct FileReport {
    pub source_id: String,
    pub path: PathBuf,
    pub outcome: std::result::Result<UploadResult, String>,
}

/// Run every producer to completion
pub async fn run(client: &ClipdockClient, config: &ProducerConfig) -> Result<Vec<FileReport>> {
    let assignments = assign_folders(&config.folders, config.producers);

    let mut tasks = Vec::with_capacity(assignments.len());
    for (i, folder) in assignments.into_iter().enumerate() {
        let source_id = format!("producer-{}", i + 1);
        let files = scan_videos(&folder).await?;
        info!(source_id = %source_id, folder = %folder.display(), files = files.len(), "Folder scanned");
        tasks.push(run_producer(client, source_id, files, config.stagger));
    }

    Ok(join_all(tasks).await.into_iter().flatten().collect())
}

async fn run_producer(
    client: &ClipdockClient,
    source_id: String,
    files: Vec<PathBuf>,
    stagger: Duration,
) -> Vec<FileReport> {
    let uploads = files.into_iter().enumerate().map(|(i, path)| {
        let source_id = source_id.clone();
        async move {
            tokio::time::sleep(stagger * i as u32).await;
            let outcome = client
                .upload_file(&path, source_id.clone())
                .await
                .map_err(|e| e.to_string());
            match &outcome {
                Ok(result) => info!(
                    source_id = %source_id,
                    file = %path.display(),
                    accepted = result.accepted,
                    message = %result.message,
                    "Upload finished"
                ),
                Err(e) => warn!(source_id = %source_id, file = %path.display(), error = %e, "Upload error"),
            }
            FileReport {
                source_id,
                path,
                outcome,
            }
        }
    });
    join_all(uploads).await
}
