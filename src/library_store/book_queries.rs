use super::job_queries::{format_datetime, parse_datetime};
use super::models::{Author, BookRecord, CoverImage, StoredBook, UpsertOutcome};
use crate::mapper::BOOLEAN_INT_MAPPER;
use crate::sqlite_persistence::TransactionContext;
use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

pub trait BookStore: Send + Sync {
    /// Inserts the book, or refreshes its metadata when the id already exists.
    /// An existing cover is left untouched.
    fn upsert_book(&self, ctx: &TransactionContext<'_>, book: &BookRecord)
        -> Result<UpsertOutcome>;
    /// Returns false when no book had this id.
    fn delete_book(&self, ctx: &TransactionContext<'_>, book_id: i64) -> Result<bool>;
    /// Returns false when no book had this id.
    fn update_book_cover(
        &self,
        ctx: &TransactionContext<'_>,
        book_id: i64,
        cover: &CoverImage,
    ) -> Result<bool>;
    fn get_book(&self, ctx: &TransactionContext<'_>, book_id: i64) -> Result<Option<StoredBook>>;
    fn get_book_cover(&self, ctx: &TransactionContext<'_>, book_id: i64)
        -> Result<Option<CoverImage>>;
    fn count_books(&self, ctx: &TransactionContext<'_>) -> Result<u64>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteBookStore;

impl SqliteBookStore {
    pub fn new() -> Self {
        Self
    }

    fn row_to_book(row: &rusqlite::Row) -> rusqlite::Result<StoredBook> {
        let authors_json: String = row.get("authors")?;
        let authors: Vec<Author> = serde_json::from_str(&authors_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
        let date_added: String = row.get("date_added")?;

        Ok(StoredBook {
            record: BookRecord {
                id: row.get("id")?,
                title: row.get("title")?,
                authors,
                genre: row.get("genre")?,
                language: row.get("language")?,
                series: row.get("series")?,
                series_number: row.get("series_number")?,
                file_path: row.get("file_path")?,
                archive_path: row.get("archive_path")?,
                file_size: row.get("file_size")?,
                date_added: parse_datetime(10, &date_added)?,
            },
            has_cover: BOOLEAN_INT_MAPPER.map_right(row.get("has_cover")?),
        })
    }
}

impl BookStore for SqliteBookStore {
    fn upsert_book(
        &self,
        ctx: &TransactionContext<'_>,
        book: &BookRecord,
    ) -> Result<UpsertOutcome> {
        let conn = ctx.writer("upsert_book")?;
        let authors = serde_json::to_string(&book.authors)
            .with_context(|| format!("Failed to encode authors of book {}", book.id))?;
        let date_added = format_datetime(&book.date_added);

        let exists = conn
            .query_row(
                "SELECT 1 FROM books WHERE id = ?1",
                params![book.id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if exists {
            conn.execute(
                "UPDATE books SET title = ?2, authors = ?3, genre = ?4, language = ?5,
                    series = ?6, series_number = ?7, file_path = ?8, archive_path = ?9,
                    file_size = ?10, date_added = ?11
                 WHERE id = ?1",
                params![
                    book.id,
                    book.title,
                    authors,
                    book.genre,
                    book.language,
                    book.series,
                    book.series_number,
                    book.file_path,
                    book.archive_path,
                    book.file_size,
                    date_added
                ],
            )?;
            Ok(UpsertOutcome::Updated)
        } else {
            conn.execute(
                "INSERT INTO books (id, title, authors, genre, language, series, series_number,
                    file_path, archive_path, file_size, date_added, has_cover)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    book.id,
                    book.title,
                    authors,
                    book.genre,
                    book.language,
                    book.series,
                    book.series_number,
                    book.file_path,
                    book.archive_path,
                    book.file_size,
                    date_added,
                    BOOLEAN_INT_MAPPER.map_left(false)
                ],
            )?;
            Ok(UpsertOutcome::Added)
        }
    }

    fn delete_book(&self, ctx: &TransactionContext<'_>, book_id: i64) -> Result<bool> {
        let conn = ctx.writer("delete_book")?;
        let rows = conn.execute("DELETE FROM books WHERE id = ?1", params![book_id])?;
        Ok(rows > 0)
    }

    fn update_book_cover(
        &self,
        ctx: &TransactionContext<'_>,
        book_id: i64,
        cover: &CoverImage,
    ) -> Result<bool> {
        let conn = ctx.writer("update_book_cover")?;
        let rows = conn.execute(
            "UPDATE books SET cover_image = ?1, has_cover = ?2 WHERE id = ?3",
            params![cover.bytes(), BOOLEAN_INT_MAPPER.map_left(true), book_id],
        )?;
        Ok(rows > 0)
    }

    fn get_book(&self, ctx: &TransactionContext<'_>, book_id: i64) -> Result<Option<StoredBook>> {
        let book = ctx
            .reader()
            .query_row(
                "SELECT id, title, authors, genre, language, series, series_number, file_path,
                    archive_path, file_size, date_added, has_cover
                 FROM books WHERE id = ?1",
                params![book_id],
                Self::row_to_book,
            )
            .optional()?;
        Ok(book)
    }

    fn get_book_cover(
        &self,
        ctx: &TransactionContext<'_>,
        book_id: i64,
    ) -> Result<Option<CoverImage>> {
        let bytes: Option<Option<Vec<u8>>> = ctx
            .reader()
            .query_row(
                "SELECT cover_image FROM books WHERE id = ?1",
                params![book_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes.flatten().map(CoverImage::new))
    }

    fn count_books(&self, ctx: &TransactionContext<'_>) -> Result<u64> {
        let count: i64 = ctx
            .reader()
            .query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
