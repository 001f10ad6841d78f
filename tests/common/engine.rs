//! Test engine lifecycle
//!
//! Each test gets an engine over its own temporary database.

use super::constants::*;
use anyhow::Result;
use async_trait::async_trait;
use bibliotheca_server::background_jobs::{EngineComponents, JobEngine, JobNotifier};
use bibliotheca_server::catalog_source::CatalogSource;
use bibliotheca_server::config::{DatabaseSettings, JobSettings};
use bibliotheca_server::dispatch::Dispatchers;
use bibliotheca_server::library_store::{
    BookStore, Job, JobId, JobStore, SqliteBookStore, SqliteJobStore, StoredBook,
    LIBRARY_VERSIONED_SCHEMAS,
};
use bibliotheca_server::sqlite_persistence::{
    TransactionContext, TransactionManager, TransactionType,
};
use bibliotheca_server::user::{AdminEmailAuthorizer, CallerIdentity, UserStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Keeps every job it is told about. Optionally fails after recording.
#[derive(Default)]
pub struct RecordingNotifier {
    pub jobs: Mutex<Vec<Job>>,
    pub fail: bool,
}

#[async_trait]
impl JobNotifier for RecordingNotifier {
    async fn job_finished(&self, job: &Job) -> Result<()> {
        tokio::task::yield_now().await;
        self.jobs.lock().unwrap().push(job.clone());
        if self.fail {
            anyhow::bail!("notification channel is down");
        }
        Ok(())
    }
}

pub struct TestEngine {
    pub engine: JobEngine,
    pub transactions: Arc<TransactionManager>,
    pub job_store: Arc<SqliteJobStore>,
    pub book_store: Arc<dyn BookStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub dispatchers: Dispatchers,
    settings: JobSettings,

    // Keep the database directory alive until drop
    _temp_dir: TempDir,
}

pub struct TestEngineBuilder {
    book_store: Arc<dyn BookStore>,
    notifier: RecordingNotifier,
    settings: JobSettings,
    pool_size: u32,
}

impl TestEngineBuilder {
    pub fn book_store(mut self, book_store: impl BookStore + 'static) -> Self {
        self.book_store = Arc::new(book_store);
        self
    }

    pub fn failing_notifier(mut self) -> Self {
        self.notifier.fail = true;
        self
    }

    pub fn archive_parallelism(mut self, archive_parallelism: usize) -> Self {
        self.settings.archive_parallelism = archive_parallelism;
        self
    }

    pub fn heartbeat(mut self, interval: Duration, stale_threshold: Duration) -> Self {
        self.settings.heartbeat_interval = interval;
        self.settings.stale_job_threshold = stale_threshold;
        self
    }

    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Must be called from within a tokio runtime.
    pub fn build(self, source: impl CatalogSource + 'static) -> TestEngine {
        let temp_dir = TempDir::new().unwrap();
        let database = DatabaseSettings {
            pool_size: self.pool_size,
            ..DatabaseSettings::default()
        };
        let transactions = Arc::new(
            TransactionManager::open(
                temp_dir.path().join("library.db"),
                &database,
                LIBRARY_VERSIONED_SCHEMAS,
            )
            .unwrap(),
        );
        let job_store = Arc::new(SqliteJobStore::new());
        let notifier = Arc::new(self.notifier);
        let dispatchers = Dispatchers::current(2).unwrap();

        let engine = JobEngine::new(EngineComponents {
            transactions: Arc::clone(&transactions),
            job_store: Arc::clone(&job_store) as Arc<dyn JobStore>,
            book_store: Arc::clone(&self.book_store),
            source: Arc::new(source),
            authorizer: Arc::new(AdminEmailAuthorizer::new(Some(ADMIN_EMAIL.to_string()))),
            notifier: Arc::clone(&notifier) as Arc<dyn JobNotifier>,
            dispatchers: dispatchers.clone(),
            settings: self.settings.clone(),
        });

        TestEngine {
            engine,
            transactions,
            job_store,
            book_store: self.book_store,
            notifier,
            dispatchers,
            settings: self.settings,
            _temp_dir: temp_dir,
        }
    }
}

pub fn admin() -> CallerIdentity {
    CallerIdentity::new(ADMIN_EMAIL, UserStatus::Approved)
}

pub fn reader() -> CallerIdentity {
    CallerIdentity::new(READER_EMAIL, UserStatus::Approved)
}

impl TestEngine {
    pub fn builder() -> TestEngineBuilder {
        TestEngineBuilder {
            book_store: Arc::new(SqliteBookStore::new()),
            notifier: RecordingNotifier::default(),
            settings: JobSettings {
                archive_parallelism: 4,
                cover_batch_size: 2,
                ..JobSettings::default()
            },
            pool_size: 4,
        }
    }

    pub fn new(source: impl CatalogSource + 'static) -> Self {
        Self::builder().build(source)
    }

    /// Another engine over the same database, reading from `source`.
    pub fn engine_with_source(&self, source: impl CatalogSource + 'static) -> JobEngine {
        JobEngine::new(EngineComponents {
            transactions: Arc::clone(&self.transactions),
            job_store: Arc::clone(&self.job_store) as Arc<dyn JobStore>,
            book_store: Arc::clone(&self.book_store),
            source: Arc::new(source),
            authorizer: Arc::new(AdminEmailAuthorizer::new(Some(ADMIN_EMAIL.to_string()))),
            notifier: Arc::clone(&self.notifier) as Arc<dyn JobNotifier>,
            dispatchers: self.dispatchers.clone(),
            settings: self.settings.clone(),
        })
    }

    /// Polls the job until it leaves RUNNING.
    pub async fn wait_for_terminal(&self, id: JobId) -> Job {
        tokio::time::timeout(JOB_TIMEOUT, async {
            loop {
                let job = self
                    .engine
                    .get_job(&admin(), id.value())
                    .await
                    .unwrap()
                    .expect("job row should exist");
                if job.status.is_terminal() {
                    return job;
                }
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("job did not finish in time")
    }

    /// Waits for the job and every follow-up it chains.
    pub async fn wait_idle(&self) {
        tokio::time::timeout(JOB_TIMEOUT, self.engine.wait_idle())
            .await
            .expect("engine did not become idle in time");
    }

    /// Runs `f` in a transaction on the blocking pool.
    pub async fn with_transaction<T, F>(&self, transaction_type: TransactionType, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&TransactionContext<'_>, &dyn BookStore, &dyn JobStore) -> Result<T>
            + Send
            + 'static,
    {
        let transactions = Arc::clone(&self.transactions);
        let book_store = Arc::clone(&self.book_store);
        let job_store = Arc::clone(&self.job_store);
        self.dispatchers
            .run_blocking(move || {
                transactions
                    .transaction(transaction_type, |ctx| {
                        f(ctx, book_store.as_ref(), job_store.as_ref())
                    })
                    .unwrap()
            })
            .await
            .unwrap()
    }

    pub async fn book(&self, id: i64) -> Option<StoredBook> {
        self.with_transaction(TransactionType::ReadOnly, move |ctx, books, _| {
            books.get_book(ctx, id)
        })
        .await
    }

    pub async fn book_count(&self) -> u64 {
        self.with_transaction(TransactionType::ReadOnly, |ctx, books, _| {
            books.count_books(ctx)
        })
        .await
    }
}
