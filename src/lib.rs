//! Bibliotheca Server Library
//!
//! Background job engine of the ebook library: catalog import and cover
//! extraction jobs, their persistence, and the concurrency plumbing they run on.

pub mod background_jobs;
pub mod catalog_source;
pub mod config;
pub mod dispatch;
pub mod library_store;
pub mod mapper;
pub mod metrics;
pub mod sqlite_persistence;
pub mod user;

// Re-export commonly used types for convenience
pub use background_jobs::{EngineComponents, JobEngine, JobEngineError};
pub use catalog_source::{CatalogSource, InpxCatalogSource};
pub use library_store::{Job, JobId, JobStatus, JobType, SqliteBookStore, SqliteJobStore};
pub use sqlite_persistence::{TransactionManager, TransactionType};
pub use user::{AdminEmailAuthorizer, CallerIdentity, UserStatus};
