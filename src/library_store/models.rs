use crate::sqlite_persistence::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Jobs
// =============================================================================

/// Store-assigned job identifier, always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(i64);

impl JobId {
    pub fn new(id: i64) -> Result<Self, ValidationError> {
        if id <= 0 {
            return Err(ValidationError::InvalidInput(format!(
                "job id must be positive, got {}",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    DataImport,
    CoverExtraction,
}

impl JobType {
    pub const ALL: [JobType; 2] = [JobType::DataImport, JobType::CoverExtraction];

    /// Lowercase name used in logs and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            JobType::DataImport => "data_import",
            JobType::CoverExtraction => "cover_extraction",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 3] = [JobStatus::Running, JobStatus::Completed, JobStatus::Failed];

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// The seven per-run counters, as persisted on a job row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub files_processed: u64,
    pub books_added: u64,
    pub books_updated: u64,
    pub books_deleted: u64,
    pub covers_added: u64,
    pub book_errors: u64,
    pub cover_errors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: String,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Books
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub last_name: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
}

impl Author {
    /// "Last, First Middle", dropping the parts that are missing.
    pub fn full_name(&self) -> String {
        let mut name = self.last_name.clone();
        if let Some(first_name) = &self.first_name {
            name.push_str(", ");
            name.push_str(first_name);
            if let Some(middle_name) = &self.middle_name {
                name.push(' ');
                name.push_str(middle_name);
            }
        }
        name
    }
}

/// Book metadata as read from a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    pub authors: Vec<Author>,
    pub genre: Option<String>,
    pub language: String,
    pub series: Option<String>,
    pub series_number: Option<i64>,
    pub file_path: String,
    pub archive_path: String,
    pub file_size: Option<i64>,
    pub date_added: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBook {
    pub record: BookRecord,
    pub has_cover: bool,
}

/// Cover image bytes. Equality compares content.
#[derive(Clone, PartialEq, Eq)]
pub struct CoverImage {
    bytes: Vec<u8>,
}

impl CoverImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Sniffed from the magic bytes, `None` when the payload is not an image.
    pub fn mime_type(&self) -> Option<&'static str> {
        if !infer::is_image(&self.bytes) {
            return None;
        }
        infer::get(&self.bytes).map(|kind| kind.mime_type())
    }
}

impl fmt::Debug for CoverImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverImage")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
}
