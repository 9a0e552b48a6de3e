// Bounded Queue - admission control in front of a fixed worker pool
//
// Admission is check-then-act against the pending set: a job is either appended
// or shed on the spot, never parked waiting for room. Admitted jobs start in FIFO
// order as worker slots free up.

mod job;

pub use job::{Admission, JobError, JobId, JobOutcome, JobTicket, QueueFull, QueueJob};

use crate::error::{AppError, Result};
use crate::port::IdProvider;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, info, warn};

/// What counts against `max_pending` at admission time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityMode {
    /// Only jobs waiting for a worker
    #[default]
    Pending,
    /// Waiting plus running jobs
    InFlight,
}

impl fmt::Display for CapacityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityMode::Pending => write!(f, "pending"),
            CapacityMode::InFlight => write!(f, "in-flight"),
        }
    }
}

impl FromStr for CapacityMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(CapacityMode::Pending),
            "in-flight" | "inflight" | "in_flight" => Ok(CapacityMode::InFlight),
            other => Err(AppError::Config(format!(
                "unknown capacity mode '{other}' (expected 'pending' or 'in-flight')"
            ))),
        }
    }
}

/// Queue limits, fixed at construction.
///
/// Only obtainable through [`QueueConfig::new`], so every queue has at least one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    max_pending: usize,
    concurrency: usize,
    capacity_mode: CapacityMode,
}

impl QueueConfig {
    /// Validate limits.
    ///
    /// `concurrency = 0` is refused: such a queue would admit jobs that never run.
    /// `max_pending = 0` is allowed and sheds every job.
    pub fn new(max_pending: usize, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(AppError::Config(
                "queue concurrency must be at least 1".to_string(),
            ));
        }
        if max_pending == 0 {
            warn!("Queue max_pending is 0: every job will be rejected");
        }
        Ok(Self {
            max_pending,
            concurrency,
            capacity_mode: CapacityMode::default(),
        })
    }

    pub fn with_capacity_mode(mut self, capacity_mode: CapacityMode) -> Self {
        self.capacity_mode = capacity_mode;
        self
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn capacity_mode(&self) -> CapacityMode {
        self.capacity_mode
    }
}

/// Point-in-time counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub max_pending: usize,
    pub concurrency: usize,
    pub pending: usize,
    pub active: usize,
    pub admitted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub failed: u64,
}

struct PendingJob<J: QueueJob> {
    id: JobId,
    job: J,
    started_tx: oneshot::Sender<()>,
    outcome_tx: oneshot::Sender<JobOutcome<J::Output>>,
}

struct QueueState<J: QueueJob> {
    pending: VecDeque<PendingJob<J>>,
    active: usize,
    admitted: u64,
    rejected: u64,
    succeeded: u64,
    failed: u64,
}

struct Inner<J: QueueJob> {
    config: QueueConfig,
    state: Mutex<QueueState<J>>,
    idle: Notify,
    id_provider: Arc<dyn IdProvider>,
}

/// Fixed-capacity pending set plus fixed-size worker pool.
///
/// Cloning is cheap and shares the same queue. The state lock is only held for
/// constant-time bookkeeping, never across an `.await`. Must be used from within a
/// tokio runtime: admission schedules the drain on a spawned task.
pub struct BoundedQueue<J: QueueJob> {
    inner: Arc<Inner<J>>,
}

impl<J: QueueJob> Clone for BoundedQueue<J> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<J: QueueJob> BoundedQueue<J> {
    pub fn new(config: QueueConfig, id_provider: Arc<dyn IdProvider>) -> Self {
        info!(
            max_pending = config.max_pending,
            concurrency = config.concurrency,
            capacity_mode = %config.capacity_mode,
            "Bounded queue created"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    active: 0,
                    admitted: 0,
                    rejected: 0,
                    succeeded: 0,
                    failed: 0,
                }),
                idle: Notify::new(),
                id_provider,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<J>> {
        // Bookkeeping never panics mid-update, so a poisoned lock still holds consistent counts
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit or shed `job`.
    ///
    /// A rejected job is dropped without running. An accepted job is appended to the
    /// tail of the pending set and a drain is scheduled asynchronously, so this call
    /// never runs the job itself.
    pub fn try_enqueue(&self, job: J) -> Admission<J::Output> {
        let config = self.inner.config;
        let description = job.describe();

        let mut state = self.state();
        let occupied = match config.capacity_mode {
            CapacityMode::Pending => state.pending.len(),
            CapacityMode::InFlight => state.pending.len() + state.active,
        };

        if occupied >= config.max_pending {
            state.rejected += 1;
            let full = QueueFull {
                pending: state.pending.len(),
                active: state.active,
                max_pending: config.max_pending,
            };
            drop(state);

            warn!(
                job = %description,
                pending = full.pending,
                max_pending = full.max_pending,
                active = full.active,
                concurrency = config.concurrency,
                "Queue full, job dropped"
            );
            return Admission::Rejected(full);
        }

        let job_id = self.inner.id_provider.generate_id();
        let (started_tx, started_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        state.pending.push_back(PendingJob {
            id: job_id.clone(),
            job,
            started_tx,
            outcome_tx,
        });
        state.admitted += 1;
        let (pending, active) = (state.pending.len(), state.active);
        drop(state);

        info!(
            job_id = %job_id,
            job = %description,
            pending,
            max_pending = config.max_pending,
            active,
            concurrency = config.concurrency,
            "Job enqueued"
        );

        let queue = self.clone();
        tokio::spawn(async move { queue.drain() });

        Admission::Accepted(JobTicket {
            job_id,
            started: started_rx,
            outcome: outcome_rx,
        })
    }

    /// Start pending jobs while worker slots are free
    fn drain(&self) {
        let ready = {
            let mut state = self.state();
            let mut ready = Vec::new();
            while state.active < self.inner.config.concurrency {
                match state.pending.pop_front() {
                    Some(job) => {
                        state.active += 1;
                        ready.push(job);
                    }
                    None => break,
                }
            }
            ready
        };

        for job in ready {
            self.start(job);
        }
    }

    fn start(&self, pending: PendingJob<J>) {
        let queue = self.clone();

        tokio::spawn(async move {
            let PendingJob {
                id,
                job,
                started_tx,
                outcome_tx,
            } = pending;
            let description = job.describe();

            info!(job_id = %id, job = %description, "Job started");
            if started_tx.send(()).is_err() {
                debug!(job_id = %id, "Nobody is observing job start");
            }

            // Own task per job: a panic surfaces as a JoinError instead of killing the worker
            let outcome = match tokio::spawn(job.run()).await {
                Ok(result) => result,
                Err(join_err) if join_err.is_panic() => {
                    Err(JobError::Panicked(panic_message(join_err.into_panic())))
                }
                Err(_) => Err(JobError::Cancelled),
            };

            queue.complete(&id, &description, &outcome);
            if outcome_tx.send(outcome).is_err() {
                debug!(job_id = %id, "Nobody is observing job outcome");
            }
            queue.drain();
        });
    }

    fn complete(&self, job_id: &str, description: &str, outcome: &JobOutcome<J::Output>) {
        let (pending, active, idle) = {
            let mut state = self.state();
            state.active -= 1;
            match outcome {
                Ok(_) => state.succeeded += 1,
                Err(_) => state.failed += 1,
            }
            let idle = state.active == 0 && state.pending.is_empty();
            (state.pending.len(), state.active, idle)
        };

        match outcome {
            Ok(_) => info!(job_id = %job_id, job = %description, pending, active, "Job finished"),
            Err(JobError::StreamAborted { bytes_written }) => warn!(
                job_id = %job_id,
                job = %description,
                bytes_written,
                pending,
                active,
                "Job ended with an aborted stream"
            ),
            Err(e) => error!(
                job_id = %job_id,
                job = %description,
                error = %e,
                pending,
                active,
                "Job failed"
            ),
        }

        if idle {
            self.inner.idle.notify_waiters();
        }
    }

    pub fn stats(&self) -> QueueStats {
        let config = self.inner.config;
        let state = self.state();
        QueueStats {
            max_pending: config.max_pending,
            concurrency: config.concurrency,
            pending: state.pending.len(),
            active: state.active,
            admitted: state.admitted,
            rejected: state.rejected,
            succeeded: state.succeeded,
            failed: state.failed,
        }
    }

    pub fn is_idle(&self) -> bool {
        let state = self.state();
        state.active == 0 && state.pending.is_empty()
    }

    /// Resolve once nothing is pending or running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
