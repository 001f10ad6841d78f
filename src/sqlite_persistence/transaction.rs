use super::connection::SqliteConnectionManager;
use super::versioned_schema::{apply_schemas, VersionedSchema};
use crate::config::DatabaseSettings;
use crate::metrics;
use anyhow::Context;
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    ReadOnly,
    ReadWrite,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::ReadOnly => "read_only",
            TransactionType::ReadWrite => "read_write",
        }
    }
}

/// Rejected input or a capability violation, detected before touching the database.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Write operation '{operation}' attempted in a read-only transaction")]
    ReadOnlyScope { operation: &'static str },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Job {id} is not running")]
    JobNotRunning { id: i64 },
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Failed to acquire database connection: {0}")]
    Connection(#[from] r2d2::Error),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The transaction body failed and everything it wrote was rolled back.
    #[error("{0:#}")]
    Aborted(anyhow::Error),
}

impl TransactionError {
    /// The validation failure that aborted the transaction, if that is what happened.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            TransactionError::Aborted(cause) => cause.downcast_ref::<ValidationError>(),
            _ => None,
        }
    }
}

/// Capability bound to one open transaction.
///
/// Queries read through [`reader`](Self::reader) and must obtain their
/// connection for writes from [`writer`](Self::writer), which refuses inside a
/// read-only scope.
pub struct TransactionContext<'a> {
    conn: &'a Connection,
    transaction_type: TransactionType,
}

impl<'a> TransactionContext<'a> {
    fn new(conn: &'a Connection, transaction_type: TransactionType) -> Self {
        Self {
            conn,
            transaction_type,
        }
    }

    pub fn reader(&self) -> &'a Connection {
        self.conn
    }

    pub fn writer(&self, operation: &'static str) -> Result<&'a Connection, ValidationError> {
        match self.transaction_type {
            TransactionType::ReadWrite => Ok(self.conn),
            TransactionType::ReadOnly => Err(ValidationError::ReadOnlyScope { operation }),
        }
    }
}

/// Owns the connection pool and hands out scoped transactions.
///
/// The pool has a fixed size. When every connection is checked out,
/// [`transaction`](Self::transaction) parks the calling thread until one is
/// returned, so it must only be called from the blocking domain.
pub struct TransactionManager {
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl TransactionManager {
    pub fn open<P: AsRef<Path>>(
        db_path: P,
        settings: &DatabaseSettings,
        schemas: &[VersionedSchema],
    ) -> anyhow::Result<Self> {
        let path = db_path.as_ref();
        let manager =
            SqliteConnectionManager::new(path, Duration::from_millis(settings.busy_timeout_ms));

        let mut conn = manager
            .open()
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        let version = apply_schemas(&mut conn, schemas)
            .with_context(|| format!("Failed to prepare database schema at {:?}", path))?;
        drop(conn);

        let pool = r2d2::Pool::builder()
            .max_size(settings.pool_size)
            .min_idle(Some(1))
            .connection_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .build(manager)
            .context("Failed to create connection pool")?;

        info!(
            "Opened database {:?} (schema version {}, pool size {})",
            path,
            version,
            pool.max_size()
        );
        Ok(Self { pool })
    }

    /// Runs `block` inside one transaction.
    ///
    /// A read-write scope commits when `block` succeeds. A read-only scope is
    /// released without committing. Any error from `block` rolls back and is
    /// returned as [`TransactionError::Aborted`].
    pub fn transaction<T, F>(
        &self,
        transaction_type: TransactionType,
        block: F,
    ) -> Result<T, TransactionError>
    where
        F: FnOnce(&TransactionContext<'_>) -> anyhow::Result<T>,
    {
        let started = Instant::now();
        let result = self.run_transaction(transaction_type, block);
        let outcome = match (&result, transaction_type) {
            (Ok(_), TransactionType::ReadWrite) => "committed",
            (Ok(_), TransactionType::ReadOnly) => "released",
            (Err(TransactionError::Aborted(_)), _) => "rolled_back",
            (Err(_), _) => "error",
        };
        metrics::record_transaction(transaction_type.as_str(), outcome, started.elapsed());
        result
    }

    fn run_transaction<T, F>(
        &self,
        transaction_type: TransactionType,
        block: F,
    ) -> Result<T, TransactionError>
    where
        F: FnOnce(&TransactionContext<'_>) -> anyhow::Result<T>,
    {
        let mut conn = self.pool.get()?;
        // Writers take the lock up front so two writers never deadlock on upgrade
        let behavior = match transaction_type {
            TransactionType::ReadOnly => TransactionBehavior::Deferred,
            TransactionType::ReadWrite => TransactionBehavior::Immediate,
        };
        let tx = conn.transaction_with_behavior(behavior)?;

        let result = block(&TransactionContext::new(&tx, transaction_type));

        match result {
            Ok(value) => {
                match transaction_type {
                    TransactionType::ReadWrite => tx.commit()?,
                    TransactionType::ReadOnly => tx.rollback()?,
                }
                Ok(value)
            }
            Err(cause) => {
                if let Err(e) = tx.rollback() {
                    warn!("Rollback failed after transaction error: {}", e);
                }
                Err(TransactionError::Aborted(cause))
            }
        }
    }
}
