mod book_queries;
mod job_queries;
mod mappers;
mod models;
mod schema;

pub use book_queries::{BookStore, SqliteBookStore};
pub use job_queries::{JobStore, SqliteJobStore, INTERRUPTED_JOB_MESSAGE};
pub use mappers::{
    StoredJobStatus, StoredJobType, StoredUserStatus, JOB_STATUS_MAPPER, JOB_TYPE_MAPPER,
    USER_STATUS_MAPPER,
};
pub use models::*;
pub use schema::LIBRARY_VERSIONED_SCHEMAS;
