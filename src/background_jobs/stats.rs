use crate::library_store::StatsSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of one job run.
///
/// Shared by every task of the run and snapshotted when progress is flushed.
/// A snapshot may mix values from slightly different instants.
#[derive(Debug, Default)]
pub struct ImportStats {
    files_processed: AtomicU64,
    books_added: AtomicU64,
    books_updated: AtomicU64,
    books_deleted: AtomicU64,
    covers_added: AtomicU64,
    book_errors: AtomicU64,
    cover_errors: AtomicU64,
}

macro_rules! counter {
    ($field:ident, $inc:ident, $add:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $add(&self, n: u64) {
            self.$field.fetch_add(n, Ordering::Relaxed);
        }
    };
}

impl ImportStats {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(files_processed, inc_files_processed, add_files_processed);
    counter!(books_added, inc_books_added, add_books_added);
    counter!(books_updated, inc_books_updated, add_books_updated);
    counter!(books_deleted, inc_books_deleted, add_books_deleted);
    counter!(covers_added, inc_covers_added, add_covers_added);
    counter!(book_errors, inc_book_errors, add_book_errors);
    counter!(cover_errors, inc_cover_errors, add_cover_errors);

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            books_added: self.books_added.load(Ordering::Relaxed),
            books_updated: self.books_updated.load(Ordering::Relaxed),
            books_deleted: self.books_deleted.load(Ordering::Relaxed),
            covers_added: self.covers_added.load(Ordering::Relaxed),
            book_errors: self.book_errors.load(Ordering::Relaxed),
            cover_errors: self.cover_errors.load(Ordering::Relaxed),
        }
    }
}
