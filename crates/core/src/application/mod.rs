// Application Layer - Use Cases and Business Logic

pub mod ingest;
pub mod listing;
pub mod queue;
pub mod shutdown;

// Re-exports
pub use ingest::{IngestConfig, IngestService, SessionHandle, UploadJob};
pub use listing::ListingService;
pub use queue::{BoundedQueue, CapacityMode, QueueConfig, QueueStats};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
