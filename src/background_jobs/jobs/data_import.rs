//! Imports book metadata from the catalog index.
//!
//! Each index member is imported in its own read-write transaction, so an
//! archive is either fully applied or not at all. Members are processed
//! concurrently, up to `archive_parallelism` at a time.

use crate::background_jobs::context::JobContext;
use crate::background_jobs::job::{BackgroundJob, JobError};
use crate::catalog_source::{ArchiveRef, CatalogEntry};
use crate::library_store::{JobType, UpsertOutcome};
use crate::sqlite_persistence::TransactionType;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct ArchiveTally {
    added: u64,
    updated: u64,
    deleted: u64,
    errors: u64,
}

pub struct DataImportJob;

impl DataImportJob {
    fn import_archive(ctx: &JobContext, archive: &ArchiveRef) -> Result<(), JobError> {
        let entries = match ctx.source.read_catalog_entries(archive) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping catalog archive {}: {:#}", archive.name, e);
                ctx.stats.inc_book_errors();
                return Ok(());
            }
        };

        let tally = ctx.transaction(TransactionType::ReadWrite, |tx| {
            let mut tally = ArchiveTally::default();
            for entry in &entries {
                match entry {
                    Ok(CatalogEntry::Book(book)) => {
                        match ctx.book_store.upsert_book(tx, book)? {
                            UpsertOutcome::Added => tally.added += 1,
                            UpsertOutcome::Updated => tally.updated += 1,
                        }
                    }
                    Ok(CatalogEntry::Deleted { book_id }) => {
                        ctx.book_store.delete_book(tx, *book_id)?;
                        tally.deleted += 1;
                    }
                    Err(e) => {
                        debug!("{}: {}", archive.name, e);
                        tally.errors += 1;
                    }
                }
            }
            Ok(tally)
        })?;

        // Counted only once the archive is committed
        ctx.stats.add_books_added(tally.added);
        ctx.stats.add_books_updated(tally.updated);
        ctx.stats.add_books_deleted(tally.deleted);
        ctx.stats.add_book_errors(tally.errors);
        ctx.stats.inc_files_processed();

        if tally.errors > 0 {
            warn!(
                "{}: {} entries could not be imported",
                archive.name, tally.errors
            );
        }
        debug!("Imported {}: {:?}", archive.name, tally);
        Ok(())
    }
}

impl BackgroundJob for DataImportJob {
    fn job_type(&self) -> JobType {
        JobType::DataImport
    }

    fn initial_progress(&self) -> &'static str {
        "Starting import..."
    }

    fn execute(&self, ctx: &JobContext) -> Result<String, JobError> {
        ctx.update_progress("Parsing INPX data...")?;
        let archives = ctx
            .source
            .list_catalog_archives()
            .map_err(JobError::Source)?;
        let total = archives.len();
        info!(
            "Job {}: importing {} catalog archives from {}",
            ctx.job_id,
            total,
            ctx.source.location()
        );

        let done = Arc::new(AtomicUsize::new(0));
        let worker_ctx = ctx.clone();
        ctx.process_concurrently(
            archives,
            ctx.settings.archive_parallelism,
            move |archive| {
                Self::import_archive(&worker_ctx, &archive)?;
                let done = done.fetch_add(1, Ordering::Relaxed) + 1;
                worker_ctx.flush(&format!(
                    "Processed archive {}/{}: {}",
                    done, total, archive.name
                ))
            },
        )?;

        let stats = ctx.stats.snapshot();
        Ok(format!(
            "Import completed: {} books added, {} updated, {} deleted, {} errors",
            stats.books_added, stats.books_updated, stats.books_deleted, stats.book_errors
        ))
    }
}
