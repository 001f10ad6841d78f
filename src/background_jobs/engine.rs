use super::context::JobContext;
use super::job::{BackgroundJob, JobError};
use super::jobs::{CoverExtractionJob, DataImportJob};
use super::notifier::JobNotifier;
use super::stats::ImportStats;
use crate::catalog_source::CatalogSource;
use crate::config::JobSettings;
use crate::dispatch::{BridgeError, Dispatchers};
use crate::library_store::{BookStore, Job, JobId, JobStatus, JobStore, StatsSnapshot};
use crate::metrics;
use crate::sqlite_persistence::{
    TransactionError, TransactionManager, TransactionType, ValidationError,
};
use crate::user::{Authorizer, CallerIdentity};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum JobEngineError {
    #[error("Admin rights required")]
    Forbidden,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Dispatch(#[from] BridgeError),
}

/// Everything the engine needs, wired by the caller.
pub struct EngineComponents {
    pub transactions: Arc<TransactionManager>,
    pub job_store: Arc<dyn JobStore>,
    pub book_store: Arc<dyn BookStore>,
    pub source: Arc<dyn CatalogSource>,
    pub authorizer: Arc<dyn Authorizer>,
    pub notifier: Arc<dyn JobNotifier>,
    pub dispatchers: Dispatchers,
    pub settings: JobSettings,
}

struct EngineInner {
    components: EngineComponents,
    /// Runs started and not yet fully finished, follow-ups included.
    active_runs: watch::Sender<usize>,
}

/// Decrements the active run count when the supervisor is done.
struct ActiveRun(Arc<EngineInner>);

impl ActiveRun {
    fn enter(inner: Arc<EngineInner>) -> Self {
        inner.active_runs.send_modify(|n| *n += 1);
        Self(inner)
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.0.active_runs.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Starts jobs, supervises them to a terminal state and answers job queries.
///
/// Every entry point checks admin rights first. Database work is always
/// dispatched to the blocking domain, so the entry points can be awaited from
/// request handlers.
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<EngineInner>,
}

impl JobEngine {
    pub fn new(components: EngineComponents) -> Self {
        let (active_runs, _) = watch::channel(0);
        Self {
            inner: Arc::new(EngineInner {
                components,
                active_runs,
            }),
        }
    }

    fn authorize(&self, caller: &CallerIdentity) -> Result<(), JobEngineError> {
        if self.inner.components.authorizer.is_admin(caller) {
            Ok(())
        } else {
            warn!("Rejected job request from {}", caller.email);
            Err(JobEngineError::Forbidden)
        }
    }

    /// Starts a catalog import and returns as soon as the job row exists.
    /// With `extract_covers`, a cover extraction job follows once the import
    /// has finished.
    pub async fn start_data_import(
        &self,
        caller: &CallerIdentity,
        extract_covers: bool,
    ) -> Result<JobId, JobEngineError> {
        self.authorize(caller)?;
        let follow_up =
            extract_covers.then(|| Arc::new(CoverExtractionJob) as Arc<dyn BackgroundJob>);
        start_job(Arc::clone(&self.inner), Arc::new(DataImportJob), follow_up).await
    }

    pub async fn start_cover_extraction(
        &self,
        caller: &CallerIdentity,
    ) -> Result<JobId, JobEngineError> {
        self.authorize(caller)?;
        start_job(Arc::clone(&self.inner), Arc::new(CoverExtractionJob), None).await
    }

    /// `Ok(None)` for an unknown id. A non-positive id is a validation error.
    pub async fn get_job(
        &self,
        caller: &CallerIdentity,
        id: i64,
    ) -> Result<Option<Job>, JobEngineError> {
        self.authorize(caller)?;
        let id = JobId::new(id)?;
        let inner = Arc::clone(&self.inner);
        let job = self
            .inner
            .components
            .dispatchers
            .run_blocking(move || {
                let c = &inner.components;
                c.transactions
                    .transaction(TransactionType::ReadOnly, |ctx| c.job_store.get_job(ctx, id))
            })
            .await??;
        Ok(job)
    }

    /// Most recently started first.
    pub async fn get_all_jobs(&self, caller: &CallerIdentity) -> Result<Vec<Job>, JobEngineError> {
        self.authorize(caller)?;
        let inner = Arc::clone(&self.inner);
        let jobs = self
            .inner
            .components
            .dispatchers
            .run_blocking(move || {
                let c = &inner.components;
                c.transactions
                    .transaction(TransactionType::ReadOnly, |ctx| c.job_store.get_all_jobs(ctx))
            })
            .await??;
        Ok(jobs)
    }

    /// Fails the RUNNING jobs whose heartbeat is older than the configured
    /// stale threshold, i.e. jobs left behind by a process that went away.
    /// Jobs of live runs, in this or another process, keep their heartbeat
    /// fresh and are left alone.
    pub async fn recover_interrupted_jobs(&self) -> Result<usize, JobEngineError> {
        let threshold = self.inner.components.settings.stale_job_threshold;
        let stale_before = chrono::Duration::from_std(threshold)
            .ok()
            .and_then(|threshold| Utc::now().checked_sub_signed(threshold))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let inner = Arc::clone(&self.inner);
        let count = self
            .inner
            .components
            .dispatchers
            .run_blocking(move || {
                let c = &inner.components;
                c.transactions.transaction(TransactionType::ReadWrite, |ctx| {
                    c.job_store.mark_stale_jobs_failed(ctx, stale_before)
                })
            })
            .await??;
        if count > 0 {
            warn!("Marked {} interrupted jobs as failed", count);
        }
        Ok(count)
    }

    /// Resolves once no job is running and no follow-up is pending.
    pub async fn wait_idle(&self) {
        let mut active_runs = self.inner.active_runs.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = active_runs.wait_for(|n| *n == 0).await;
    }
}

/// Creates the job row and starts its supervisor in one detached task.
/// The returned future only reports the id, so dropping it still leaves the
/// job supervised.
// Boxed because the supervisor it spawns starts follow-ups through it
fn start_job(
    inner: Arc<EngineInner>,
    job: Arc<dyn BackgroundJob>,
    follow_up: Option<Arc<dyn BackgroundJob>>,
) -> BoxFuture<'static, Result<JobId, JobEngineError>> {
    let active = ActiveRun::enter(Arc::clone(&inner));
    let launch = inner
        .components
        .dispatchers
        .handle()
        .spawn(launch_job(active, job, follow_up));
    async move {
        match launch.await {
            Ok(result) => result,
            Err(e) => Err(BridgeError::Panicked(e.to_string()).into()),
        }
    }
    .boxed()
}

async fn launch_job(
    active: ActiveRun,
    job: Arc<dyn BackgroundJob>,
    follow_up: Option<Arc<dyn BackgroundJob>>,
) -> Result<JobId, JobEngineError> {
    let inner = Arc::clone(&active.0);
    let job_type = job.job_type();
    let progress = job.initial_progress();
    let creator = Arc::clone(&inner);
    let id = inner
        .components
        .dispatchers
        .run_blocking(move || {
            let c = &creator.components;
            c.transactions.transaction(TransactionType::ReadWrite, |ctx| {
                c.job_store.create_job(ctx, job_type, progress)
            })
        })
        .await??;

    info!("Starting job: {} (id: {})", job_type, id);
    tokio::spawn(supervise(active, id, job, follow_up));
    Ok(id)
}

/// Runs the job on the blocking domain and records its terminal state.
async fn supervise(
    active: ActiveRun,
    id: JobId,
    job: Arc<dyn BackgroundJob>,
    follow_up: Option<Arc<dyn BackgroundJob>>,
) {
    let inner = Arc::clone(&active.0);
    let job_type = job.job_type();
    let c = &inner.components;
    let ctx = JobContext {
        job_id: id,
        stats: Arc::new(ImportStats::new()),
        transactions: Arc::clone(&c.transactions),
        job_store: Arc::clone(&c.job_store),
        book_store: Arc::clone(&c.book_store),
        source: Arc::clone(&c.source),
        dispatchers: c.dispatchers.clone(),
        settings: c.settings.clone(),
    };
    let stats = Arc::clone(&ctx.stats);

    metrics::record_job_started(job_type.label());
    let start_time = Instant::now();
    let heartbeat = tokio::spawn(heartbeat(Arc::clone(&inner), id));
    let result = c.dispatchers.run_blocking(move || job.execute(&ctx)).await;
    heartbeat.abort();
    let elapsed = start_time.elapsed();

    let outcome = match result {
        Ok(Ok(message)) => {
            info!("Job {} completed successfully in {:?}", id, elapsed);
            Ok(message)
        }
        Ok(Err(e)) => {
            error!("Job {} failed after {:?}: {}", id, elapsed, e);
            Err(e.to_string())
        }
        Err(BridgeError::Panicked(message)) => {
            error!("Job {} panicked after {:?}: {}", id, elapsed, message);
            Err(format!("Task panic: {}", message))
        }
        Err(e) => {
            error!("Job {} could not run: {}", id, e);
            Err(e.to_string())
        }
    };
    let status = if outcome.is_ok() {
        JobStatus::Completed
    } else {
        JobStatus::Failed
    };
    metrics::record_job_finished(job_type.label(), status.label(), elapsed);

    let snapshot = stats.snapshot();
    let finisher = Arc::clone(&inner);
    let finished = c
        .dispatchers
        .run_blocking(move || finish_job(&finisher, id, &snapshot, &outcome))
        .await;
    match finished {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Failed to record terminal state of job {}: {}", id, e),
        Err(e) => error!("Failed to record terminal state of job {}: {}", id, e),
    }

    if let Some(next) = follow_up {
        match start_job(Arc::clone(&inner), next, None).await {
            Ok(next_id) => info!("Job {} chained job {}", id, next_id),
            Err(e) => error!("Failed to start follow-up of job {}: {}", id, e),
        }
    }
    drop(active);
}

/// Refreshes the job's heartbeat until aborted by the supervisor.
async fn heartbeat(inner: Arc<EngineInner>, id: JobId) {
    let period = inner
        .components
        .settings
        .heartbeat_interval
        .max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately and the row was just created
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let toucher = Arc::clone(&inner);
        let touched = inner
            .components
            .dispatchers
            .run_blocking(move || {
                let c = &toucher.components;
                c.transactions.transaction(TransactionType::ReadWrite, |ctx| {
                    c.job_store.touch_job(ctx, id)
                })
            })
            .await;
        match touched {
            Ok(Ok(())) => debug!("Job {} heartbeat", id),
            Ok(Err(e)) => warn!("Failed to refresh heartbeat of job {}: {}", id, e),
            Err(e) => warn!("Failed to refresh heartbeat of job {}: {}", id, e),
        }
    }
}

/// Commits the final stats and terminal status in one transaction, then
/// notifies. Runs on the blocking domain.
fn finish_job(
    inner: &EngineInner,
    id: JobId,
    stats: &StatsSnapshot,
    outcome: &Result<String, String>,
) -> Result<(), JobError> {
    let c = &inner.components;
    let job = c
        .transactions
        .transaction(TransactionType::ReadWrite, |ctx| {
            c.job_store.update_stats(ctx, id, stats)?;
            match outcome {
                Ok(message) => c.job_store.complete_job(ctx, id, message)?,
                Err(error_message) => c.job_store.fail_job(ctx, id, error_message)?,
            }
            c.job_store.get_job(ctx, id)
        })
        .or_else(|e| {
            // Leave no job RUNNING when its completion could not be recorded
            error!("Failed to finish job {}: {}", id, e);
            c.transactions
                .transaction(TransactionType::ReadWrite, |ctx| {
                    c.job_store
                        .fail_job(ctx, id, &format!("Failed to record job result: {}", e))?;
                    c.job_store.get_job(ctx, id)
                })
        })?;

    if let Some(job) = job {
        match c.dispatchers.run_blocking_bridge(c.notifier.job_finished(&job)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to notify about job {}: {:#}", id, e),
            Err(e) => warn!("Failed to notify about job {}: {}", id, e),
        }
    }
    Ok(())
}
