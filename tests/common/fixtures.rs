//! Catalog data for tests: a scripted in-memory source, a book store that
//! misbehaves on demand, and builders for real INPX and FB2 archives.

use super::constants::*;
use anyhow::{bail, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bibliotheca_server::catalog_source::{
    ArchiveRef, CatalogEntry, CatalogSource, CoverEntry, EntryError,
};
use bibliotheca_server::library_store::{
    Author, BookRecord, BookStore, CoverImage, SqliteBookStore, StoredBook, UpsertOutcome,
};
use bibliotheca_server::sqlite_persistence::TransactionContext;
use chrono::{TimeZone, Utc};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub fn book(id: i64, title: &str) -> BookRecord {
    BookRecord {
        id,
        title: title.to_string(),
        authors: vec![Author {
            last_name: "Chekhov".to_string(),
            first_name: Some("Anton".to_string()),
            middle_name: None,
        }],
        genre: Some("prose_classic".to_string()),
        language: "ru".to_string(),
        series: None,
        series_number: None,
        file_path: format!("{}.fb2", id),
        archive_path: "scripted".to_string(),
        file_size: Some(1024),
        date_added: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
    }
}

pub fn good(id: i64) -> Result<CatalogEntry, EntryError> {
    Ok(CatalogEntry::Book(book(id, &format!("Book {}", id))))
}

pub fn corrupt(line: usize) -> Result<CatalogEntry, EntryError> {
    Err(EntryError::TooFewFields { line, found: 3 })
}

pub fn deleted(book_id: i64) -> Result<CatalogEntry, EntryError> {
    Ok(CatalogEntry::Deleted { book_id })
}

pub fn cover(book_id: i64) -> Result<CoverEntry, EntryError> {
    Ok(CoverEntry {
        book_id,
        cover: CoverImage::new(PNG_COVER.to_vec()),
    })
}

struct ScriptedArchive<T> {
    archive: ArchiveRef,
    content: std::result::Result<Vec<Result<T, EntryError>>, String>,
}

/// In-memory catalog source. Archives are returned in insertion order.
#[derive(Default)]
pub struct ScriptedSource {
    catalog: Vec<ScriptedArchive<CatalogEntry>>,
    books: Vec<ScriptedArchive<CoverEntry>>,
    listing_error: Option<String>,
    read_delay: Option<Duration>,
}

fn archive_ref(name: &str) -> ArchiveRef {
    ArchiveRef {
        name: name.to_string(),
        path: PathBuf::from(SCRIPTED_LOCATION).join(name),
    }
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog_archive(
        mut self,
        name: &str,
        entries: Vec<Result<CatalogEntry, EntryError>>,
    ) -> Self {
        self.catalog.push(ScriptedArchive {
            archive: archive_ref(name),
            content: Ok(entries),
        });
        self
    }

    pub fn with_unreadable_catalog_archive(mut self, name: &str) -> Self {
        self.catalog.push(ScriptedArchive {
            archive: archive_ref(name),
            content: Err(format!("{} is damaged", name)),
        });
        self
    }

    pub fn with_book_archive(
        mut self,
        name: &str,
        covers: Vec<Result<CoverEntry, EntryError>>,
    ) -> Self {
        self.books.push(ScriptedArchive {
            archive: archive_ref(name),
            content: Ok(covers),
        });
        self
    }

    /// Listing archives fails, which no job can recover from.
    pub fn with_listing_error(mut self, message: &str) -> Self {
        self.listing_error = Some(message.to_string());
        self
    }

    /// Every archive read sleeps first, keeping jobs observable while RUNNING.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    fn read<T: Clone>(&self, archives: &[ScriptedArchive<T>], archive: &ArchiveRef) -> Result<Vec<Result<T, EntryError>>> {
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }
        match archives.iter().find(|a| a.archive == *archive) {
            Some(ScriptedArchive {
                content: Ok(entries),
                ..
            }) => Ok(entries.clone()),
            Some(ScriptedArchive {
                content: Err(reason),
                ..
            }) => bail!("{}", reason),
            None => bail!("Unknown archive {}", archive.name),
        }
    }

    fn list<T>(&self, archives: &[ScriptedArchive<T>]) -> Result<Vec<ArchiveRef>> {
        if let Some(message) = &self.listing_error {
            bail!("{}", message);
        }
        Ok(archives.iter().map(|a| a.archive.clone()).collect())
    }
}

impl CatalogSource for ScriptedSource {
    fn location(&self) -> String {
        SCRIPTED_LOCATION.to_string()
    }

    fn list_catalog_archives(&self) -> Result<Vec<ArchiveRef>> {
        self.list(&self.catalog)
    }

    fn read_catalog_entries(
        &self,
        archive: &ArchiveRef,
    ) -> Result<Vec<Result<CatalogEntry, EntryError>>> {
        self.read(&self.catalog, archive)
    }

    fn list_book_archives(&self) -> Result<Vec<ArchiveRef>> {
        self.list(&self.books)
    }

    fn read_covers(&self, archive: &ArchiveRef) -> Result<Vec<Result<CoverEntry, EntryError>>> {
        self.read(&self.books, archive)
    }
}

/// How [`FaultyBookStore`] misbehaves on the chosen book.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Error,
    Panic,
}

/// SQLite book store that fails when asked to upsert one particular book.
pub struct FaultyBookStore {
    inner: SqliteBookStore,
    book_id: i64,
    fault: Fault,
}

impl FaultyBookStore {
    pub fn new(book_id: i64, fault: Fault) -> Self {
        Self {
            inner: SqliteBookStore::new(),
            book_id,
            fault,
        }
    }
}

impl BookStore for FaultyBookStore {
    fn upsert_book(&self, ctx: &TransactionContext<'_>, book: &BookRecord) -> Result<UpsertOutcome> {
        if book.id == self.book_id {
            match self.fault {
                Fault::Error => bail!("disk I/O error while writing book {}", book.id),
                Fault::Panic => panic!("boom on book {}", book.id),
            }
        }
        self.inner.upsert_book(ctx, book)
    }

    fn delete_book(&self, ctx: &TransactionContext<'_>, book_id: i64) -> Result<bool> {
        self.inner.delete_book(ctx, book_id)
    }

    fn update_book_cover(
        &self,
        ctx: &TransactionContext<'_>,
        book_id: i64,
        cover: &CoverImage,
    ) -> Result<bool> {
        self.inner.update_book_cover(ctx, book_id, cover)
    }

    fn get_book(&self, ctx: &TransactionContext<'_>, book_id: i64) -> Result<Option<StoredBook>> {
        self.inner.get_book(ctx, book_id)
    }

    fn get_book_cover(&self, ctx: &TransactionContext<'_>, book_id: i64) -> Result<Option<CoverImage>> {
        self.inner.get_book_cover(ctx, book_id)
    }

    fn count_books(&self, ctx: &TransactionContext<'_>) -> Result<u64> {
        self.inner.count_books(ctx)
    }
}

// ============================================================================
// Real archives
// ============================================================================

fn write_zip(path: &Path, members: &[(String, Vec<u8>)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, content) in members {
        zip.start_file(name.as_str(), SimpleFileOptions::default())
            .unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}

/// One INP line with the standard field order.
pub fn inp_line(id: i64, authors: &str, title: &str, deleted: bool) -> String {
    let id = id.to_string();
    [
        authors,
        "prose_classic:",
        title,
        "",
        "",
        id.as_str(),
        "2048",
        id.as_str(),
        if deleted { "1" } else { "0" },
        "fb2",
        "2012-03-04",
        "ru",
        "",
    ]
    .join("\u{4}")
}

/// Writes an `.inpx` index with one `.inp` member per `(archive name, lines)`.
pub fn write_inpx(dir: &Path, file_name: &str, members: &[(&str, Vec<String>)]) {
    let members: Vec<(String, Vec<u8>)> = members
        .iter()
        .map(|(name, lines)| (format!("{}.inp", name), lines.join("\r\n").into_bytes()))
        .collect();
    write_zip(&dir.join(file_name), &members);
}

/// FB2 document whose coverpage points at an embedded binary.
pub fn fb2_document(title: &str, cover: Option<&[u8]>) -> Vec<u8> {
    let mut doc = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
<description><title-info><book-title>{}</book-title>"#,
        title
    );
    if cover.is_some() {
        doc.push_str(r##"<coverpage><image l:href="#cover.png"/></coverpage>"##);
    }
    doc.push_str("</title-info></description><body><p>Text</p></body>\n");
    if let Some(bytes) = cover {
        doc.push_str(&format!(
            "<binary id=\"cover.png\" content-type=\"image/png\">{}</binary>\n",
            STANDARD.encode(bytes)
        ));
    }
    doc.push_str("</FictionBook>");
    doc.into_bytes()
}

/// Writes a book archive holding `<id>.fb2` members.
pub fn write_fb2_archive(dir: &Path, file_name: &str, books: &[(i64, Option<&[u8]>)]) {
    let members: Vec<(String, Vec<u8>)> = books
        .iter()
        .map(|(id, cover)| {
            (
                format!("{}.fb2", id),
                fb2_document(&format!("Book {}", id), *cover),
            )
        })
        .collect();
    write_zip(&dir.join(file_name), &members);
}
