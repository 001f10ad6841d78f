//! Acquisition of catalog entries and cover images from packaged archives.
//!
//! The engine only sees the [`CatalogSource`] trait. The INPX implementation
//! reads a zipped `.inpx` index for book metadata and `fb2` zip archives for
//! covers.

mod fb2;
mod inpx;

pub use fb2::extract_cover;
pub use inpx::{parse_inp_line, InpxCatalogSource};

use crate::library_store::{BookRecord, CoverImage};
use std::path::PathBuf;
use thiserror::Error;

/// One unit of acquisition work: an index member or a book archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRef {
    /// Archive name, as recorded on the books it contains.
    pub name: String,
    /// File the archive lives in.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntry {
    Book(BookRecord),
    /// The catalog marks this book as removed.
    Deleted { book_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverEntry {
    pub book_id: i64,
    pub cover: CoverImage,
}

/// A single entry that could not be turned into a record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("line {line}: expected at least 8 fields, found {found}")]
    TooFewFields { line: usize, found: usize },
    #[error("line {line}: invalid book id '{value}'")]
    InvalidBookId { line: usize, value: String },
    #[error("line {line}: book {book_id} has no authors")]
    MissingAuthors { line: usize, book_id: i64 },
    #[error("{entry}: name is not a book id")]
    InvalidEntryName { entry: String },
    #[error("{entry}: no cover image")]
    NoCover { entry: String },
    #[error("{entry}: {reason}")]
    Unreadable { entry: String, reason: String },
}

/// Source of catalog data.
///
/// Listing and opening an archive fail with an error for the whole archive.
/// Individual entries fail on their own without affecting their neighbours.
pub trait CatalogSource: Send + Sync {
    /// Human-readable location, used in job messages.
    fn location(&self) -> String;

    fn list_catalog_archives(&self) -> anyhow::Result<Vec<ArchiveRef>>;

    fn read_catalog_entries(
        &self,
        archive: &ArchiveRef,
    ) -> anyhow::Result<Vec<Result<CatalogEntry, EntryError>>>;

    fn list_book_archives(&self) -> anyhow::Result<Vec<ArchiveRef>>;

    fn read_covers(&self, archive: &ArchiveRef)
        -> anyhow::Result<Vec<Result<CoverEntry, EntryError>>>;
}
