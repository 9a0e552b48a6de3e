// Ingest constants (no magic values)
use std::time::Duration;

/// How long a finished stream waits for its job to start before responding (5s)
pub const DEFAULT_ADMISSION_WAIT: Duration = Duration::from_secs(5);

/// Stream events buffered between the transport and a session
pub const SESSION_EVENT_CAPACITY: usize = 64;

/// Default maximum number of pending uploads
pub const DEFAULT_MAX_PENDING: usize = 10;

/// Default number of uploads written concurrently
pub const DEFAULT_CONCURRENCY: usize = 4;
