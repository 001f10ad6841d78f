use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub books_data_path: Option<String>,
    pub inpx_file_name: Option<String>,
    pub admin_email: Option<String>,

    // Tuning sections
    pub database: Option<DatabaseConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub jobs: Option<JobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub pool_size: Option<u32>,
    pub busy_timeout_ms: Option<u64>,
    pub acquire_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub worker_threads: Option<usize>,
    pub max_blocking_threads: Option<usize>,
    pub compute_threads: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub archive_parallelism: Option<usize>,
    pub cover_batch_size: Option<usize>,
    pub heartbeat_interval_secs: Option<u64>,
    pub stale_job_threshold_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
