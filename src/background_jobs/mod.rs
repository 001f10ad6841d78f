//! Background job execution.
//!
//! [`JobEngine`] creates a job row, runs the job on the blocking domain and
//! records the terminal state. Jobs report progress by flushing their
//! [`ImportStats`] into the job row as they go.

mod context;
mod engine;
mod job;
pub mod jobs;
mod notifier;
mod stats;

pub use context::JobContext;
pub use engine::{EngineComponents, JobEngine, JobEngineError};
pub use job::{BackgroundJob, JobError};
pub use notifier::{JobNotifier, LoggingJobNotifier};
pub use stats::ImportStats;
