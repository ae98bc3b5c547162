//! Video generation and post-processing worker.
//!
//! The orchestration core: task pollers driving provider tasks to
//! completion, the post-processing pipeline orchestrator, the fan-out
//! controller for batch/variant requests, and the per-queue executors that
//! tie them to the job streams.

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod fanout;
pub mod handlers;
pub mod logging;
pub mod pipeline;
pub mod poller;
pub mod publisher;
pub mod retry;

pub use clock::{Clock, TokioClock};
pub use config::WorkerConfig;
pub use context::{JobSink, ProcessingContext};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use fanout::FanoutController;
pub use poller::{PollOutcome, TaskPoller};
pub use publisher::StatusPublisher;
