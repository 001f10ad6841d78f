use crate::library_store::Job;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Receives every job that reaches a terminal state.
///
/// Called through the blocking bridge after the terminal row is committed.
/// Delivery is best effort: errors are logged and otherwise ignored.
#[async_trait]
pub trait JobNotifier: Send + Sync {
    async fn job_finished(&self, job: &Job) -> Result<()>;
}

/// Writes a summary line to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingJobNotifier;

#[async_trait]
impl JobNotifier for LoggingJobNotifier {
    async fn job_finished(&self, job: &Job) -> Result<()> {
        match &job.error_message {
            Some(error) => info!(
                "Job {} ({}) finished {}: {}",
                job.id,
                job.job_type,
                job.status.label(),
                error
            ),
            None => info!(
                "Job {} ({}) finished {}: {}",
                job.id,
                job.job_type,
                job.status.label(),
                job.progress
            ),
        }
        Ok(())
    }
}
