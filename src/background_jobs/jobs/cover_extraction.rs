//! Extracts cover images from FB2 book archives and attaches them to books.

use crate::background_jobs::context::JobContext;
use crate::background_jobs::job::{BackgroundJob, JobError};
use crate::catalog_source::{ArchiveRef, CoverEntry};
use crate::library_store::JobType;
use crate::sqlite_persistence::TransactionType;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CoverExtractionJob;

impl CoverExtractionJob {
    fn extract_archive(ctx: &JobContext, archive: &ArchiveRef) -> Result<(), JobError> {
        let entries = match ctx.source.read_covers(archive) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping book archive {}: {:#}", archive.name, e);
                ctx.stats.inc_cover_errors();
                return Ok(());
            }
        };

        let mut covers = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Ok(cover) => covers.push(cover),
                Err(e) => {
                    debug!("{}: {}", archive.name, e);
                    ctx.stats.inc_cover_errors();
                }
            }
        }

        // Sniffing image headers is CPU-bound
        let (images, rejected): (Vec<CoverEntry>, Vec<CoverEntry>) = ctx
            .dispatchers
            .install(|| {
                covers
                    .into_par_iter()
                    .partition(|entry| entry.cover.mime_type().is_some())
            });
        for entry in &rejected {
            debug!(
                "{}: book {} cover is not an image",
                archive.name, entry.book_id
            );
        }
        ctx.stats.add_cover_errors(rejected.len() as u64);

        for batch in images.chunks(ctx.settings.cover_batch_size.max(1)) {
            let (added, unknown) = ctx.transaction(TransactionType::ReadWrite, |tx| {
                let mut added = 0u64;
                let mut unknown = 0u64;
                for entry in batch {
                    if ctx.book_store.update_book_cover(tx, entry.book_id, &entry.cover)? {
                        added += 1;
                    } else {
                        unknown += 1;
                    }
                }
                Ok((added, unknown))
            })?;
            ctx.stats.add_covers_added(added);
            ctx.stats.add_cover_errors(unknown);
            if unknown > 0 {
                debug!("{}: {} covers for unknown books", archive.name, unknown);
            }
        }

        ctx.stats.inc_files_processed();
        Ok(())
    }
}

impl BackgroundJob for CoverExtractionJob {
    fn job_type(&self) -> JobType {
        JobType::CoverExtraction
    }

    fn initial_progress(&self) -> &'static str {
        "Starting cover extraction..."
    }

    fn execute(&self, ctx: &JobContext) -> Result<String, JobError> {
        ctx.update_progress("Finding FB2 archives...")?;
        let archives = ctx.source.list_book_archives().map_err(JobError::Source)?;
        if archives.is_empty() {
            return Err(JobError::ExecutionFailed(format!(
                "No FB2 archives found in {}",
                ctx.source.location()
            )));
        }
        let total = archives.len();
        info!(
            "Job {}: extracting covers from {} archives",
            ctx.job_id, total
        );

        let done = Arc::new(AtomicUsize::new(0));
        let worker_ctx = ctx.clone();
        ctx.process_concurrently(
            archives,
            ctx.settings.archive_parallelism,
            move |archive| {
                Self::extract_archive(&worker_ctx, &archive)?;
                let done = done.fetch_add(1, Ordering::Relaxed) + 1;
                worker_ctx.flush(&format!(
                    "Processed archive {}/{}: {}",
                    done, total, archive.name
                ))
            },
        )?;

        let stats = ctx.stats.snapshot();
        Ok(format!(
            "Cover extraction completed: {} covers added, {} errors",
            stats.covers_added, stats.cover_errors
        ))
    }
}
