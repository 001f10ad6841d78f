//! SQLite schema definitions for the library database.
//!
//! Version 1 holds the book catalog, version 2 adds import job tracking and
//! version 3 a heartbeat telling live runs from interrupted ones.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Books
// =============================================================================

/// Books table - one row per catalog entry, cover stored inline
const BOOKS_TABLE_V1: Table = Table {
    name: "books",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("authors", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("genre", &SqlType::Text),
        sqlite_column!("language", &SqlType::Text, non_null = true),
        sqlite_column!("series", &SqlType::Text),
        sqlite_column!("series_number", &SqlType::Integer),
        sqlite_column!("file_path", &SqlType::Text, non_null = true),
        sqlite_column!("archive_path", &SqlType::Text, non_null = true),
        sqlite_column!("file_size", &SqlType::Integer),
        sqlite_column!("date_added", &SqlType::Text, non_null = true),
        sqlite_column!(
            "has_cover",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("cover_image", &SqlType::Blob),
    ],
    indices: &[("idx_books_archive_path", "archive_path")],
};

// =============================================================================
// Version 2 - Import jobs
// =============================================================================

/// Import jobs table - one row per data import or cover extraction run
const IMPORT_JOBS_TABLE_V2: Table = Table {
    name: "import_jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("job_type", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!(
            "progress",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "files_processed",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "books_added",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "books_updated",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "books_deleted",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "covers_added",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "book_errors",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "cover_errors",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("started_at", &SqlType::Text, non_null = true),
        sqlite_column!("completed_at", &SqlType::Text),
    ],
    indices: &[
        ("idx_import_jobs_status", "status"),
        ("idx_import_jobs_started_at", "started_at DESC"),
    ],
};

/// Migration from version 1 to version 2: add import_jobs table
fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    IMPORT_JOBS_TABLE_V2.create(conn)
}

// =============================================================================
// Version 3 - Job heartbeat
// =============================================================================

/// Import jobs table with the heartbeat of the owning run
const IMPORT_JOBS_TABLE_V3: Table = Table {
    name: "import_jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("job_type", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!(
            "progress",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "files_processed",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "books_added",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "books_updated",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "books_deleted",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "covers_added",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "book_errors",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "cover_errors",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("started_at", &SqlType::Text, non_null = true),
        sqlite_column!("completed_at", &SqlType::Text),
        sqlite_column!("heartbeat_at", &SqlType::Text),
    ],
    indices: &[
        ("idx_import_jobs_status", "status"),
        ("idx_import_jobs_started_at", "started_at DESC"),
    ],
};

/// Migration from version 2 to version 3: add heartbeat_at, seeded from started_at
fn migrate_v2_to_v3(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute("ALTER TABLE import_jobs ADD COLUMN heartbeat_at TEXT", [])?;
    conn.execute("UPDATE import_jobs SET heartbeat_at = started_at", [])?;
    Ok(())
}

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[BOOKS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[BOOKS_TABLE_V1, IMPORT_JOBS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
    VersionedSchema {
        version: 3,
        tables: &[BOOKS_TABLE_V1, IMPORT_JOBS_TABLE_V3],
        migration: Some(migrate_v2_to_v3),
    },
];
