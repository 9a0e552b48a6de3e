// Storage Writer Port
// Abstraction over where uploaded bytes end up (filesystem in production, memory in tests)

use crate::domain::{DestinationName, DomainError};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use thiserror::Error;

/// A file that was fully written and closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Final name inside the storage root (may differ from the requested name)
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("destination already exists: {0}")]
    AlreadyExists(String),

    #[error("no free name derived from '{name}' after {attempts} attempts")]
    NamesExhausted { name: String, attempts: u32 },

    #[error("invalid destination: {0}")]
    InvalidDestination(#[from] DomainError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An open destination accepting ordered writes.
///
/// `finish` consumes the sink, so every sink resolves exactly once: either to the
/// stored file or to an error. A sink dropped without `finish` leaves whatever was
/// written so far.
#[async_trait]
pub trait MediaSink: Send {
    /// Append a chunk after all previously written chunks
    async fn write(&mut self, chunk: Bytes) -> Result<(), StorageError>;

    /// Flush, sync and close
    async fn finish(self: Box<Self>) -> Result<StoredFile, StorageError>;
}

/// Storage Writer trait
///
/// Implementations:
/// - FsStorageWriter (clipdock-infra-fs): files under a root directory
/// - mocks::MemoryStorageWriter: in-memory, with failure injection
#[async_trait]
pub trait StorageWriter: Send + Sync {
    /// Open a sink for a sanitized destination
    ///
    /// # Errors
    /// - StorageError::AlreadyExists if the collision policy forbids reusing a name
    /// - StorageError::Io if the destination cannot be created
    async fn open(&self, destination: &DestinationName) -> Result<Box<dyn MediaSink>, StorageError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    /// Mock writer behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Store everything
        Success,
        /// Fail when opening the sink
        FailOpen(String),
        /// Fail on the first write
        FailWrite(String),
        /// Accept writes, fail when finishing
        FailFinish(String),
    }

    /// In-memory Storage Writer for testing
    #[derive(Clone)]
    pub struct MemoryStorageWriter {
        behavior: MockBehavior,
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        open_count: Arc<AtomicUsize>,
        finish_gate: Option<Arc<Semaphore>>,
    }

    impl MemoryStorageWriter {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                files: Arc::new(Mutex::new(HashMap::new())),
                open_count: Arc::new(AtomicUsize::new(0)),
                finish_gate: None,
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        /// Every `finish` waits for one permit of `gate` (keeps jobs running)
        pub fn with_finish_gate(mut self, gate: Arc<Semaphore>) -> Self {
            self.finish_gate = Some(gate);
            self
        }

        /// Content of a finished file
        pub fn file(&self, name: &str) -> Option<Vec<u8>> {
            self.files.lock().unwrap().get(name).cloned()
        }

        pub fn file_names(&self) -> Vec<String> {
            let mut names: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
            names.sort();
            names
        }

        pub fn open_count(&self) -> usize {
            self.open_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StorageWriter for MemoryStorageWriter {
        async fn open(
            &self,
            destination: &DestinationName,
        ) -> Result<Box<dyn MediaSink>, StorageError> {
            self.open_count.fetch_add(1, Ordering::SeqCst);

            if let MockBehavior::FailOpen(msg) = &self.behavior {
                return Err(StorageError::Io(std::io::Error::other(msg.clone())));
            }

            let name = destination.as_str().to_string();
            {
                let mut files = self.files.lock().unwrap();
                if files.contains_key(&name) {
                    return Err(StorageError::AlreadyExists(name));
                }
                // Reserve the name like create-new would
                files.insert(name.clone(), Vec::new());
            }

            Ok(Box::new(MemorySink {
                name,
                data: Vec::new(),
                behavior: self.behavior.clone(),
                files: Arc::clone(&self.files),
                finish_gate: self.finish_gate.clone(),
            }))
        }
    }

    struct MemorySink {
        name: String,
        data: Vec<u8>,
        behavior: MockBehavior,
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        finish_gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl MediaSink for MemorySink {
        async fn write(&mut self, chunk: Bytes) -> Result<(), StorageError> {
            if let MockBehavior::FailWrite(msg) = &self.behavior {
                return Err(StorageError::Io(std::io::Error::other(msg.clone())));
            }
            self.data.extend_from_slice(&chunk);
            Ok(())
        }

        async fn finish(self: Box<Self>) -> Result<StoredFile, StorageError> {
            if let Some(gate) = &self.finish_gate {
                gate.acquire().await.unwrap().forget();
            }
            if let MockBehavior::FailFinish(msg) = &self.behavior {
                return Err(StorageError::Io(std::io::Error::other(msg.clone())));
            }

            let size_bytes = self.data.len() as u64;
            self.files
                .lock()
                .unwrap()
                .insert(self.name.clone(), self.data.clone());

            Ok(StoredFile {
                path: PathBuf::from(format!("memory://{}", self.name)),
                name: self.name,
                size_bytes,
            })
        }
    }
}
