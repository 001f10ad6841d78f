use super::mappers::{StoredJobStatus, StoredJobType, JOB_STATUS_MAPPER, JOB_TYPE_MAPPER};
use super::models::{Job, JobId, JobStatus, JobType, StatsSnapshot};
use crate::sqlite_persistence::{TransactionContext, ValidationError};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};

pub const INTERRUPTED_JOB_MESSAGE: &str = "Job was interrupted (server restart)";

/// Persistence of import job rows.
///
/// Every write only touches a job that is still RUNNING and fails with
/// [`ValidationError::JobNotRunning`] otherwise, which keeps terminal rows
/// immutable.
pub trait JobStore: Send + Sync {
    fn create_job(
        &self,
        ctx: &TransactionContext<'_>,
        job_type: JobType,
        progress: &str,
    ) -> Result<JobId>;
    fn update_progress(&self, ctx: &TransactionContext<'_>, id: JobId, progress: &str)
        -> Result<()>;
    /// Counters only move up: each one is stored as the max of the old and new value.
    fn update_stats(
        &self,
        ctx: &TransactionContext<'_>,
        id: JobId,
        stats: &StatsSnapshot,
    ) -> Result<()>;
    fn complete_job(&self, ctx: &TransactionContext<'_>, id: JobId, message: &str) -> Result<()>;
    fn fail_job(&self, ctx: &TransactionContext<'_>, id: JobId, error_message: &str)
        -> Result<()>;
    fn get_job(&self, ctx: &TransactionContext<'_>, id: JobId) -> Result<Option<Job>>;
    /// Most recently started first.
    fn get_all_jobs(&self, ctx: &TransactionContext<'_>) -> Result<Vec<Job>>;
    /// Records that the owning run is still alive. Progress and stats
    /// updates refresh the heartbeat as well.
    fn touch_job(&self, ctx: &TransactionContext<'_>, id: JobId) -> Result<()>;
    /// Fails every RUNNING job whose last heartbeat is older than `stale_before`.
    fn mark_stale_jobs_failed(
        &self,
        ctx: &TransactionContext<'_>,
        stale_before: DateTime<Utc>,
    ) -> Result<usize>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteJobStore;

const JOB_COLUMNS: &str = "id, job_type, status, progress, files_processed, books_added, \
     books_updated, books_deleted, covers_added, book_errors, cover_errors, error_message, \
     started_at, completed_at";

// Fixed width so lexical order matches chronological order
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl SqliteJobStore {
    pub fn new() -> Self {
        Self
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let id: i64 = row.get("id")?;
        let job_type: StoredJobType = row.get("job_type")?;
        let status: StoredJobStatus = row.get("status")?;
        let started_at: String = row.get("started_at")?;
        let completed_at: Option<String> = row.get("completed_at")?;

        Ok(Job {
            id: JobId::new(id).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Integer,
                    Box::new(e),
                )
            })?,
            job_type: JOB_TYPE_MAPPER.map_right(job_type),
            status: JOB_STATUS_MAPPER.map_right(status),
            progress: row.get("progress")?,
            stats: StatsSnapshot {
                files_processed: from_sql_count(row.get("files_processed")?),
                books_added: from_sql_count(row.get("books_added")?),
                books_updated: from_sql_count(row.get("books_updated")?),
                books_deleted: from_sql_count(row.get("books_deleted")?),
                covers_added: from_sql_count(row.get("covers_added")?),
                book_errors: from_sql_count(row.get("book_errors")?),
                cover_errors: from_sql_count(row.get("cover_errors")?),
            },
            error_message: row.get("error_message")?,
            started_at: parse_datetime(12, &started_at)?,
            completed_at: completed_at
                .map(|s| parse_datetime(13, &s))
                .transpose()?,
        })
    }

    fn ensure_updated(id: JobId, rows: usize) -> Result<()> {
        if rows == 0 {
            return Err(ValidationError::JobNotRunning { id: id.value() }.into());
        }
        Ok(())
    }
}

impl JobStore for SqliteJobStore {
    fn create_job(
        &self,
        ctx: &TransactionContext<'_>,
        job_type: JobType,
        progress: &str,
    ) -> Result<JobId> {
        let conn = ctx.writer("create_job")?;
        let now = format_datetime(&Utc::now());
        conn.execute(
            "INSERT INTO import_jobs (job_type, status, progress, started_at, heartbeat_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                JOB_TYPE_MAPPER.map_left(job_type),
                JOB_STATUS_MAPPER.map_left(JobStatus::Running),
                progress,
                now
            ],
        )?;
        Ok(JobId::new(conn.last_insert_rowid())?)
    }

    fn update_progress(
        &self,
        ctx: &TransactionContext<'_>,
        id: JobId,
        progress: &str,
    ) -> Result<()> {
        let conn = ctx.writer("update_progress")?;
        let now = format_datetime(&Utc::now());
        let rows = conn.execute(
            "UPDATE import_jobs SET progress = ?1, heartbeat_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                progress,
                now,
                id.value(),
                JOB_STATUS_MAPPER.map_left(JobStatus::Running)
            ],
        )?;
        Self::ensure_updated(id, rows)
    }

    fn update_stats(
        &self,
        ctx: &TransactionContext<'_>,
        id: JobId,
        stats: &StatsSnapshot,
    ) -> Result<()> {
        let conn = ctx.writer("update_stats")?;
        let now = format_datetime(&Utc::now());
        let rows = conn.execute(
            "UPDATE import_jobs SET
                files_processed = MAX(files_processed, ?1),
                books_added = MAX(books_added, ?2),
                books_updated = MAX(books_updated, ?3),
                books_deleted = MAX(books_deleted, ?4),
                covers_added = MAX(covers_added, ?5),
                book_errors = MAX(book_errors, ?6),
                cover_errors = MAX(cover_errors, ?7),
                heartbeat_at = ?8
             WHERE id = ?9 AND status = ?10",
            params![
                to_sql_count(stats.files_processed),
                to_sql_count(stats.books_added),
                to_sql_count(stats.books_updated),
                to_sql_count(stats.books_deleted),
                to_sql_count(stats.covers_added),
                to_sql_count(stats.book_errors),
                to_sql_count(stats.cover_errors),
                now,
                id.value(),
                JOB_STATUS_MAPPER.map_left(JobStatus::Running)
            ],
        )?;
        Self::ensure_updated(id, rows)
    }

    fn complete_job(&self, ctx: &TransactionContext<'_>, id: JobId, message: &str) -> Result<()> {
        let conn = ctx.writer("complete_job")?;
        let now = format_datetime(&Utc::now());
        let rows = conn.execute(
            "UPDATE import_jobs SET status = ?1, progress = ?2, completed_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                JOB_STATUS_MAPPER.map_left(JobStatus::Completed),
                message,
                now,
                id.value(),
                JOB_STATUS_MAPPER.map_left(JobStatus::Running)
            ],
        )?;
        Self::ensure_updated(id, rows)
    }

    fn fail_job(
        &self,
        ctx: &TransactionContext<'_>,
        id: JobId,
        error_message: &str,
    ) -> Result<()> {
        let conn = ctx.writer("fail_job")?;
        let now = format_datetime(&Utc::now());
        let rows = conn.execute(
            "UPDATE import_jobs SET status = ?1, error_message = ?2, completed_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                JOB_STATUS_MAPPER.map_left(JobStatus::Failed),
                error_message,
                now,
                id.value(),
                JOB_STATUS_MAPPER.map_left(JobStatus::Running)
            ],
        )?;
        Self::ensure_updated(id, rows)
    }

    fn get_job(&self, ctx: &TransactionContext<'_>, id: JobId) -> Result<Option<Job>> {
        let job = ctx
            .reader()
            .query_row(
                &format!("SELECT {} FROM import_jobs WHERE id = ?1", JOB_COLUMNS),
                params![id.value()],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn get_all_jobs(&self, ctx: &TransactionContext<'_>) -> Result<Vec<Job>> {
        let mut stmt = ctx.reader().prepare(&format!(
            "SELECT {} FROM import_jobs ORDER BY started_at DESC, id DESC",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map([], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn touch_job(&self, ctx: &TransactionContext<'_>, id: JobId) -> Result<()> {
        let conn = ctx.writer("touch_job")?;
        let now = format_datetime(&Utc::now());
        let rows = conn.execute(
            "UPDATE import_jobs SET heartbeat_at = ?1 WHERE id = ?2 AND status = ?3",
            params![now, id.value(), JOB_STATUS_MAPPER.map_left(JobStatus::Running)],
        )?;
        Self::ensure_updated(id, rows)
    }

    fn mark_stale_jobs_failed(
        &self,
        ctx: &TransactionContext<'_>,
        stale_before: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = ctx.writer("mark_stale_jobs_failed")?;
        let now = format_datetime(&Utc::now());
        let count = conn.execute(
            "UPDATE import_jobs SET status = ?1, completed_at = ?2, error_message = ?3
             WHERE status = ?4 AND COALESCE(heartbeat_at, started_at) < ?5",
            params![
                JOB_STATUS_MAPPER.map_left(JobStatus::Failed),
                now,
                INTERRUPTED_JOB_MESSAGE,
                JOB_STATUS_MAPPER.map_left(JobStatus::Running),
                format_datetime(&stale_before)
            ],
        )?;
        Ok(count)
    }
}
