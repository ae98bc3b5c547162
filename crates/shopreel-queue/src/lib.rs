//! Redis Streams job queue.
//!
//! This crate provides:
//! - Job payload types, one tagged variant per job family
//! - Enqueueing with idempotency-key deduplication
//! - Worker consumption with retry counters, DLQ and pending-claim recovery
//! - A queue registry (one stream per job type) built once at startup
//! - Progress events via Redis Pub/Sub

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;
pub mod registry;

pub use error::{QueueError, QueueResult};
pub use job::{BatchRef, ExpandBatchJob, GenerateVideoJob, JobKind, QueueJob, RunPipelineJob};
pub use progress::{ProgressChannel, ProgressEvent};
pub use queue::{JobQueue, QueueConfig};
pub use registry::QueueRegistry;
