// Queue job contract and per-job lifecycle signals

use crate::port::StorageError;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

/// Job identifier (assigned by the queue at admission)
pub type JobId = String;

/// Why a job did not succeed
#[derive(Error, Debug)]
pub enum JobError {
    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("upload stream aborted after {bytes_written} bytes")]
    StreamAborted { bytes_written: u64 },

    #[error("job panicked: {0}")]
    Panicked(String),

    #[error("job was cancelled before completing")]
    Cancelled,
}

/// A unit of deferred work run by [`super::BoundedQueue`]
#[async_trait]
pub trait QueueJob: Send + 'static {
    type Output: Send + 'static;

    /// Short description for logs
    fn describe(&self) -> String;

    /// Run to completion; the worker slot stays occupied until this resolves
    async fn run(self) -> Result<Self::Output, JobError>;
}

/// Outcome delivered on a job's completion signal
pub type JobOutcome<T> = Result<T, JobError>;

/// Handle returned for an admitted job.
///
/// The queue keeps ownership of the job; the ticket only observes it:
/// `started` fires when a worker takes the job, `outcome` when it resolves.
/// Either receiver errors if the queue dropped the job without reaching that point.
pub struct JobTicket<T> {
    pub job_id: JobId,
    pub started: oneshot::Receiver<()>,
    pub outcome: oneshot::Receiver<JobOutcome<T>>,
}

/// Result of an admission attempt
pub enum Admission<T> {
    Accepted(JobTicket<T>),
    Rejected(QueueFull),
}

impl<T> Admission<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted(_))
    }
}

/// Snapshot taken at the moment a job was shed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull {
    pub pending: usize,
    pub active: usize,
    pub max_pending: usize,
}
