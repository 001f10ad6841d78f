use super::job::JobError;
use super::stats::ImportStats;
use crate::catalog_source::CatalogSource;
use crate::config::JobSettings;
use crate::dispatch::Dispatchers;
use crate::library_store::{BookStore, JobId, JobStore};
use crate::sqlite_persistence::{TransactionContext, TransactionManager, TransactionType};
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::debug;

/// Context provided to jobs during execution.
///
/// Owns the run's [`ImportStats`] and hands out the shared resources a job
/// needs. Cheap to clone into sub-tasks of the same run.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: JobId,

    /// Counters of this run only, dropped with the last clone of the context.
    pub stats: Arc<ImportStats>,

    pub transactions: Arc<TransactionManager>,
    pub job_store: Arc<dyn JobStore>,
    pub book_store: Arc<dyn BookStore>,
    pub source: Arc<dyn CatalogSource>,
    pub dispatchers: Dispatchers,
    pub settings: JobSettings,
}

impl JobContext {
    /// Runs `block` in a transaction. Must be called from the blocking domain.
    pub fn transaction<T, F>(&self, transaction_type: TransactionType, block: F) -> Result<T, JobError>
    where
        F: FnOnce(&TransactionContext<'_>) -> anyhow::Result<T>,
    {
        Ok(self.transactions.transaction(transaction_type, block)?)
    }

    pub fn update_progress(&self, message: &str) -> Result<(), JobError> {
        self.transaction(TransactionType::ReadWrite, |ctx| {
            self.job_store.update_progress(ctx, self.job_id, message)
        })
    }

    /// Persists the progress message together with a stats snapshot.
    pub fn flush(&self, message: &str) -> Result<(), JobError> {
        let snapshot = self.stats.snapshot();
        debug!("Job {} flush: {} {:?}", self.job_id, message, snapshot);
        self.transaction(TransactionType::ReadWrite, |ctx| {
            self.job_store.update_progress(ctx, self.job_id, message)?;
            self.job_store.update_stats(ctx, self.job_id, &snapshot)
        })
    }

    /// Runs `f` over `items` on the blocking domain, at most `parallelism` at a time.
    ///
    /// Returns the first error and stops starting new items after it. Items
    /// already running are left to finish.
    pub fn process_concurrently<T, F>(
        &self,
        items: Vec<T>,
        parallelism: usize,
        f: F,
    ) -> Result<(), JobError>
    where
        T: Send + 'static,
        F: Fn(T) -> Result<(), JobError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let dispatchers = self.dispatchers.clone();
        self.dispatchers.run_blocking_bridge(async move {
            futures::stream::iter(items.into_iter().map(|item| {
                let f = Arc::clone(&f);
                dispatchers.run_blocking(move || f(item))
            }))
            .buffer_unordered(parallelism.max(1))
            .map(|joined| joined.map_err(JobError::from).and_then(|result| result))
            .try_collect::<Vec<()>>()
            .await
            .map(|_| ())
        })?
    }
}
