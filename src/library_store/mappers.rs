//! Storage-side enums and their mappers to the domain enums.
//!
//! Columns hold the `SCREAMING_SNAKE_CASE` text of the storage enum. Queries
//! bind and read the storage enum directly and convert through the mapper,
//! so the domain enums never need to know about SQL.

use super::models::{JobStatus, JobType};
use crate::mapper::TypeMapper;
use crate::user::UserStatus;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

macro_rules! stored_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                $name::parse(text).ok_or_else(|| {
                    FromSqlError::Other(
                        format!("unknown {} value '{}'", stringify!($name), text).into(),
                    )
                })
            }
        }
    };
}

stored_enum!(StoredJobType {
    DataImport => "DATA_IMPORT",
    CoverExtraction => "COVER_EXTRACTION",
});

stored_enum!(StoredJobStatus {
    Running => "RUNNING",
    Completed => "COMPLETED",
    Failed => "FAILED",
});

stored_enum!(StoredUserStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Deactivated => "DEACTIVATED",
});

fn job_type_to_stored(value: JobType) -> StoredJobType {
    match value {
        JobType::DataImport => StoredJobType::DataImport,
        JobType::CoverExtraction => StoredJobType::CoverExtraction,
    }
}

fn job_type_from_stored(value: StoredJobType) -> JobType {
    match value {
        StoredJobType::DataImport => JobType::DataImport,
        StoredJobType::CoverExtraction => JobType::CoverExtraction,
    }
}

fn job_status_to_stored(value: JobStatus) -> StoredJobStatus {
    match value {
        JobStatus::Running => StoredJobStatus::Running,
        JobStatus::Completed => StoredJobStatus::Completed,
        JobStatus::Failed => StoredJobStatus::Failed,
    }
}

fn job_status_from_stored(value: StoredJobStatus) -> JobStatus {
    match value {
        StoredJobStatus::Running => JobStatus::Running,
        StoredJobStatus::Completed => JobStatus::Completed,
        StoredJobStatus::Failed => JobStatus::Failed,
    }
}

fn user_status_to_stored(value: UserStatus) -> StoredUserStatus {
    match value {
        UserStatus::Pending => StoredUserStatus::Pending,
        UserStatus::Approved => StoredUserStatus::Approved,
        UserStatus::Rejected => StoredUserStatus::Rejected,
        UserStatus::Deactivated => StoredUserStatus::Deactivated,
    }
}

fn user_status_from_stored(value: StoredUserStatus) -> UserStatus {
    match value {
        StoredUserStatus::Pending => UserStatus::Pending,
        StoredUserStatus::Approved => UserStatus::Approved,
        StoredUserStatus::Rejected => UserStatus::Rejected,
        StoredUserStatus::Deactivated => UserStatus::Deactivated,
    }
}

pub const JOB_TYPE_MAPPER: TypeMapper<JobType, StoredJobType> =
    TypeMapper::new(job_type_to_stored, job_type_from_stored);

pub const JOB_STATUS_MAPPER: TypeMapper<JobStatus, StoredJobStatus> =
    TypeMapper::new(job_status_to_stored, job_status_from_stored);

pub const USER_STATUS_MAPPER: TypeMapper<UserStatus, StoredUserStatus> =
    TypeMapper::new(user_status_to_stored, user_status_from_stored);
