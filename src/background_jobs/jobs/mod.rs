//! Specific background job implementations.

mod cover_extraction;
mod data_import;

pub use cover_extraction::CoverExtractionJob;
pub use data_import::DataImportJob;
