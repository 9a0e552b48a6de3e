// Filesystem Storage Writer
//
// Every upload gets its own file, created with create-new semantics so that two
// writers can never share a destination. Collisions resolve per CollisionPolicy.

use async_trait::async_trait;
use bytes::Bytes;
use clipdock_core::domain::DestinationName;
use clipdock_core::error::AppError;
use clipdock_core::port::{MediaSink, StorageError, StorageWriter, StoredFile};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

/// Suffixes tried before giving up on a name
pub const MAX_UNIQUIFY_ATTEMPTS: u32 = 1000;

/// What to do when the destination name is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Store as `name-1.ext`, `name-2.ext`, ...
    #[default]
    Uniquify,
    /// Fail the upload
    Reject,
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionPolicy::Uniquify => write!(f, "uniquify"),
            CollisionPolicy::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for CollisionPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniquify" => Ok(CollisionPolicy::Uniquify),
            "reject" => Ok(CollisionPolicy::Reject),
            other => Err(AppError::Config(format!(
                "unknown collision policy '{other}' (expected 'uniquify' or 'reject')"
            ))),
        }
    }
}

/// Writes uploads as files directly under a root directory
pub struct FsStorageWriter {
    root: PathBuf,
    policy: CollisionPolicy,
}

impl FsStorageWriter {
    /// Create the root directory if needed
    pub async fn new(root: impl Into<PathBuf>, policy: CollisionPolicy) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!(root = %root.display(), policy = %policy, "Filesystem storage ready");
        Ok(Self { root, policy })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageWriter for FsStorageWriter {
    async fn open(&self, destination: &DestinationName) -> Result<Box<dyn MediaSink>, StorageError> {
        let attempts = match self.policy {
            CollisionPolicy::Reject => 1,
            CollisionPolicy::Uniquify => MAX_UNIQUIFY_ATTEMPTS + 1,
        };

        for n in 0..attempts {
            let candidate = if n == 0 {
                destination.clone()
            } else {
                destination.with_suffix(n)
            };
            let path = candidate.resolve_under(&self.root)?;

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    debug!(path = %path.display(), "Destination created");
                    return Ok(Box::new(FsSink {
                        name: candidate.as_str().to_string(),
                        path,
                        file: BufWriter::new(file),
                        written: 0,
                    }));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.policy == CollisionPolicy::Reject {
                        return Err(StorageError::AlreadyExists(candidate.as_str().to_string()));
                    }
                    debug!(taken = %candidate, "Destination exists, trying next suffix");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StorageError::NamesExhausted {
            name: destination.as_str().to_string(),
            attempts: MAX_UNIQUIFY_ATTEMPTS,
        })
    }
}

struct FsSink {
    name: String,
    path: PathBuf,
    file: BufWriter<File>,
    written: u64,
}

#[async_trait]
impl MediaSink for FsSink {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StorageError> {
        self.file.write_all(&chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<StoredFile, StorageError> {
        let FsSink {
            name,
            path,
            mut file,
            written,
        } = *self;

        file.flush().await?;
        file.get_ref().sync_all().await?;

        Ok(StoredFile {
            name,
            path,
            size_bytes: written,
        })
    }
}
