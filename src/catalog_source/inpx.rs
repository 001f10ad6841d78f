use super::fb2::extract_cover;
use super::{ArchiveRef, CatalogEntry, CatalogSource, CoverEntry, EntryError};
use crate::library_store::{Author, BookRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

const FIELD_SEPARATOR: char = '\u{4}';
const MIN_FIELDS: usize = 8;
const DEFAULT_LANGUAGE: &str = "ru";
const INP_EXTENSION: &str = ".inp";
const FB2_EXTENSION: &str = ".fb2";

/// Reads book metadata from an INPX index and covers from FB2 zip archives,
/// both living in one books directory.
#[derive(Debug, Clone)]
pub struct InpxCatalogSource {
    books_data_path: PathBuf,
    inpx_path: PathBuf,
}

impl InpxCatalogSource {
    pub fn new<P: AsRef<Path>>(books_data_path: P, inpx_file_name: &str) -> Self {
        let books_data_path = books_data_path.as_ref().to_path_buf();
        let inpx_path = books_data_path.join(inpx_file_name);
        Self {
            books_data_path,
            inpx_path,
        }
    }

    fn open_zip(path: &Path) -> Result<ZipArchive<File>> {
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        ZipArchive::new(file).with_context(|| format!("Failed to read zip archive {:?}", path))
    }
}

impl CatalogSource for InpxCatalogSource {
    fn location(&self) -> String {
        self.books_data_path.display().to_string()
    }

    fn list_catalog_archives(&self) -> Result<Vec<ArchiveRef>> {
        let zip = Self::open_zip(&self.inpx_path)?;
        let mut archives: Vec<ArchiveRef> = zip
            .file_names()
            .filter_map(|name| name.strip_suffix(INP_EXTENSION))
            .map(|name| ArchiveRef {
                name: name.to_string(),
                path: self.inpx_path.clone(),
            })
            .collect();
        archives.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(
            "Found {} .inp files in {:?}",
            archives.len(),
            self.inpx_path
        );
        Ok(archives)
    }

    fn read_catalog_entries(
        &self,
        archive: &ArchiveRef,
    ) -> Result<Vec<Result<CatalogEntry, EntryError>>> {
        let mut zip = Self::open_zip(&archive.path)?;
        let member = format!("{}{}", archive.name, INP_EXTENSION);
        let mut bytes = Vec::new();
        zip.by_name(&member)
            .with_context(|| format!("Missing {} in {:?}", member, archive.path))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read {}", member))?;

        let content = String::from_utf8_lossy(&bytes);
        let now = Utc::now();
        Ok(content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| parse_inp_line(index + 1, line, &archive.name, now))
            .collect())
    }

    fn list_book_archives(&self) -> Result<Vec<ArchiveRef>> {
        let mut archives = Vec::new();
        for entry in WalkDir::new(&self.books_data_path)
            .min_depth(1)
            .max_depth(1)
        {
            let entry = entry
                .with_context(|| format!("Failed to list {:?}", self.books_data_path))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.ends_with(".zip") && file_name.contains("fb2") {
                archives.push(ArchiveRef {
                    name: file_name,
                    path: entry.path().to_path_buf(),
                });
            }
        }
        archives.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(archives)
    }

    fn read_covers(&self, archive: &ArchiveRef) -> Result<Vec<Result<CoverEntry, EntryError>>> {
        let mut zip = Self::open_zip(&archive.path)?;
        let mut covers = Vec::new();

        for index in 0..zip.len() {
            let mut file = match zip.by_index(index) {
                Ok(file) => file,
                Err(e) => {
                    covers.push(Err(EntryError::Unreadable {
                        entry: format!("{}#{}", archive.name, index),
                        reason: e.to_string(),
                    }));
                    continue;
                }
            };
            let name = file.name().to_string();
            let Some(stem) = name.strip_suffix(FB2_EXTENSION) else {
                continue;
            };
            let Ok(book_id) = stem.parse::<i64>() else {
                covers.push(Err(EntryError::InvalidEntryName { entry: name }));
                continue;
            };

            let mut bytes = Vec::new();
            if let Err(e) = file.read_to_end(&mut bytes) {
                warn!("Failed to read {} from {}: {}", name, archive.name, e);
                covers.push(Err(EntryError::Unreadable {
                    entry: name,
                    reason: e.to_string(),
                }));
                continue;
            }

            covers.push(match extract_cover(&bytes) {
                Some(cover) => Ok(CoverEntry { book_id, cover }),
                None => Err(EntryError::NoCover { entry: name }),
            });
        }
        Ok(covers)
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Authors are `Last,First,Middle` triples separated by `:`.
fn parse_authors(field: &str) -> Vec<Author> {
    field
        .split(':')
        .filter_map(|author| {
            let mut parts = author.split(',').map(str::trim);
            let last_name = non_blank(parts.next()?)?;
            Some(Author {
                last_name,
                first_name: parts.next().and_then(non_blank),
                middle_name: parts.next().and_then(non_blank),
            })
        })
        .collect()
}

fn parse_date_added(field: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    field
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(date) => date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            Err(e) => {
                debug!("Unparseable date '{}': {}", s, e);
                None
            }
        })
        .unwrap_or(fallback)
}

/// Parses one INP line.
///
/// Fields: authors, genre, title, series, series number, book id, file size,
/// library id, deleted flag, file extension, date added, language.
/// Only the first eight are mandatory.
pub fn parse_inp_line(
    line_number: usize,
    line: &str,
    archive_name: &str,
    now: DateTime<Utc>,
) -> Result<CatalogEntry, EntryError> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() < MIN_FIELDS {
        return Err(EntryError::TooFewFields {
            line: line_number,
            found: fields.len(),
        });
    }

    let book_id = fields[5]
        .trim()
        .parse::<i64>()
        .map_err(|_| EntryError::InvalidBookId {
            line: line_number,
            value: fields[5].to_string(),
        })?;

    if fields.get(8).map(|s| s.trim()) == Some("1") {
        return Ok(CatalogEntry::Deleted { book_id });
    }

    let authors = parse_authors(fields[0]);
    if authors.is_empty() {
        return Err(EntryError::MissingAuthors {
            line: line_number,
            book_id,
        });
    }

    let extension = fields
        .get(9)
        .and_then(|s| non_blank(s))
        .unwrap_or_else(|| "fb2".to_string());

    Ok(CatalogEntry::Book(BookRecord {
        id: book_id,
        title: fields[2].trim().to_string(),
        authors,
        genre: non_blank(fields[1]),
        language: fields
            .get(11)
            .and_then(|s| non_blank(s))
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        series: non_blank(fields[3]),
        series_number: fields[4].trim().parse().ok(),
        file_path: format!("{}.{}", book_id, extension),
        archive_path: archive_name.to_string(),
        file_size: fields[6].trim().parse().ok(),
        date_added: parse_date_added(fields.get(10).copied(), now),
    }))
}
