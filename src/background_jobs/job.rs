use super::context::JobContext;
use crate::dispatch::BridgeError;
use crate::library_store::JobType;
use crate::sqlite_persistence::TransactionError;
use thiserror::Error;

/// Errors that end a job run.
///
/// Per-item failures never show up here, they are counted in the run's stats.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Transaction(#[from] TransactionError),
    #[error("{0}")]
    Bridge(#[from] BridgeError),
    #[error("{0:#}")]
    Source(anyhow::Error),
    #[error("{0}")]
    ExecutionFailed(String),
}

/// Trait for background jobs.
///
/// Jobs are executed synchronously on the blocking domain.
pub trait BackgroundJob: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Progress message stored when the job row is created.
    fn initial_progress(&self) -> &'static str;

    /// Runs the job to the end. Returns the final summary message.
    fn execute(&self, ctx: &JobContext) -> Result<String, JobError>;
}
