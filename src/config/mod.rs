mod file_config;

pub use file_config::{ConcurrencyConfig, DatabaseConfig, FileConfig, JobsConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INPX_FILE_NAME: &str = "flibusta_fb2_local.inpx";
pub const DEFAULT_DB_FILE_NAME: &str = "bibliotheca.db";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub books_data_path: Option<PathBuf>,
    pub inpx_file_name: Option<String>,
    pub admin_email: Option<String>,
    pub pool_size: Option<u32>,
    pub archive_parallelism: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub books_data_path: PathBuf,
    pub inpx_file_name: String,
    pub admin_email: Option<String>,

    pub database: DatabaseSettings,
    pub concurrency: ConcurrencySettings,
    pub jobs: JobSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// Upper bound on open connections, the only admission control for database work.
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
    /// How long a caller waits for a free connection before giving up.
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            pool_size: 10,
            busy_timeout_ms: 5000,
            acquire_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencySettings {
    pub worker_threads: usize,
    pub max_blocking_threads: usize,
    pub compute_threads: usize,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        let cpus = available_cpus();
        Self {
            worker_threads: cpus,
            max_blocking_threads: 2048,
            compute_threads: cpus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// Archives processed at the same time by one job.
    pub archive_parallelism: usize,
    /// Covers written per transaction.
    pub cover_batch_size: usize,
    /// How often a running job refreshes its heartbeat.
    pub heartbeat_interval: Duration,
    /// A RUNNING job whose heartbeat is older than this is considered
    /// abandoned by its process. Must exceed `heartbeat_interval`.
    pub stale_job_threshold: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            archive_parallelism: 8,
            cover_batch_size: 100,
            heartbeat_interval: Duration::from_secs(30),
            stale_job_threshold: Duration::from_secs(120),
        }
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let books_data_path = file
            .books_data_path
            .map(PathBuf::from)
            .or_else(|| cli.books_data_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "books_data_path must be specified via --books-path or in config file"
                )
            })?;

        if !books_data_path.exists() {
            bail!("Books directory does not exist: {:?}", books_data_path);
        }
        if !books_data_path.is_dir() {
            bail!("books_data_path is not a directory: {:?}", books_data_path);
        }

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| books_data_path.join(DEFAULT_DB_FILE_NAME));

        let inpx_file_name = file
            .inpx_file_name
            .or_else(|| cli.inpx_file_name.clone())
            .unwrap_or_else(|| DEFAULT_INPX_FILE_NAME.to_string());

        let admin_email = file
            .admin_email
            .or_else(|| cli.admin_email.clone())
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty());

        let db_defaults = DatabaseSettings::default();
        let db_file = file.database.unwrap_or_default();
        let database = DatabaseSettings {
            pool_size: db_file
                .pool_size
                .or(cli.pool_size)
                .unwrap_or(db_defaults.pool_size),
            busy_timeout_ms: db_file
                .busy_timeout_ms
                .unwrap_or(db_defaults.busy_timeout_ms),
            acquire_timeout_secs: db_file
                .acquire_timeout_secs
                .unwrap_or(db_defaults.acquire_timeout_secs),
        };

        let concurrency_defaults = ConcurrencySettings::default();
        let concurrency_file = file.concurrency.unwrap_or_default();
        let concurrency = ConcurrencySettings {
            worker_threads: concurrency_file
                .worker_threads
                .unwrap_or(concurrency_defaults.worker_threads),
            max_blocking_threads: concurrency_file
                .max_blocking_threads
                .unwrap_or(concurrency_defaults.max_blocking_threads),
            compute_threads: concurrency_file
                .compute_threads
                .unwrap_or(concurrency_defaults.compute_threads),
        };

        let job_defaults = JobSettings::default();
        let jobs_file = file.jobs.unwrap_or_default();
        let jobs = JobSettings {
            archive_parallelism: jobs_file
                .archive_parallelism
                .or(cli.archive_parallelism)
                .unwrap_or(job_defaults.archive_parallelism),
            cover_batch_size: jobs_file
                .cover_batch_size
                .unwrap_or(job_defaults.cover_batch_size),
            heartbeat_interval: jobs_file
                .heartbeat_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(job_defaults.heartbeat_interval),
            stale_job_threshold: jobs_file
                .stale_job_threshold_secs
                .map(Duration::from_secs)
                .unwrap_or(job_defaults.stale_job_threshold),
        };

        if database.pool_size == 0 {
            bail!("database.pool_size must be at least 1");
        }
        if concurrency.worker_threads == 0
            || concurrency.max_blocking_threads == 0
            || concurrency.compute_threads == 0
        {
            bail!("concurrency thread counts must be at least 1");
        }
        if jobs.archive_parallelism == 0 {
            bail!("jobs.archive_parallelism must be at least 1");
        }
        if jobs.cover_batch_size == 0 {
            bail!("jobs.cover_batch_size must be at least 1");
        }
        if jobs.heartbeat_interval.is_zero() {
            bail!("jobs.heartbeat_interval_secs must be at least 1");
        }
        if jobs.stale_job_threshold <= jobs.heartbeat_interval {
            bail!("jobs.stale_job_threshold_secs must be greater than jobs.heartbeat_interval_secs");
        }

        Ok(Self {
            db_path,
            books_data_path,
            inpx_file_name,
            admin_email,
            database,
            concurrency,
            jobs,
        })
    }

    pub fn inpx_path(&self) -> PathBuf {
        self.books_data_path.join(&self.inpx_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_temp_books_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_books_dir();
        let cli = CliConfig {
            books_data_path: Some(temp_dir.path().to_path_buf()),
            admin_email: Some("admin@example.com".to_string()),
            pool_size: Some(3),
            archive_parallelism: Some(2),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.books_data_path, temp_dir.path());
        assert_eq!(config.db_path, temp_dir.path().join(DEFAULT_DB_FILE_NAME));
        assert_eq!(config.inpx_file_name, DEFAULT_INPX_FILE_NAME);
        assert_eq!(config.inpx_path(), temp_dir.path().join(DEFAULT_INPX_FILE_NAME));
        assert_eq!(config.admin_email.as_deref(), Some("admin@example.com"));
        assert_eq!(config.database.pool_size, 3);
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.jobs.archive_parallelism, 2);
        assert_eq!(config.jobs.cover_batch_size, 100);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = make_temp_books_dir();
        let cli = CliConfig {
            books_data_path: Some(PathBuf::from("/should/be/overridden")),
            db_path: Some(PathBuf::from("/cli/library.db")),
            admin_email: Some("cli@example.com".to_string()),
            pool_size: Some(3),
            ..Default::default()
        };
        let file_config = FileConfig {
            books_data_path: Some(temp_dir.path().to_string_lossy().to_string()),
            admin_email: Some("toml@example.com".to_string()),
            inpx_file_name: Some("catalog.inpx".to_string()),
            database: Some(DatabaseConfig {
                pool_size: Some(6),
                acquire_timeout_secs: Some(30),
                ..Default::default()
            }),
            jobs: Some(JobsConfig {
                cover_batch_size: Some(10),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.books_data_path, temp_dir.path());
        // Not in TOML, CLI value kept
        assert_eq!(config.db_path, PathBuf::from("/cli/library.db"));
        assert_eq!(config.admin_email.as_deref(), Some("toml@example.com"));
        assert_eq!(config.inpx_file_name, "catalog.inpx");
        assert_eq!(config.database.pool_size, 6);
        assert_eq!(config.database.acquire_timeout_secs, 30);
        assert_eq!(config.jobs.cover_batch_size, 10);
        assert_eq!(config.jobs.archive_parallelism, 8);
    }

    #[test]
    fn test_resolve_requires_books_path() {
        let err = AppConfig::resolve(&CliConfig::default(), None).unwrap_err();
        assert!(err.to_string().contains("books_data_path must be specified"));
    }

    #[test]
    fn test_resolve_rejects_missing_books_dir() {
        let cli = CliConfig {
            books_data_path: Some(PathBuf::from("/nonexistent/books")),
            ..Default::default()
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_rejects_zero_pool_size() {
        let temp_dir = make_temp_books_dir();
        let cli = CliConfig {
            books_data_path: Some(temp_dir.path().to_path_buf()),
            pool_size: Some(0),
            ..Default::default()
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("pool_size"));
    }

    #[test]
    fn test_blank_admin_email_is_ignored() {
        let temp_dir = make_temp_books_dir();
        let cli = CliConfig {
            books_data_path: Some(temp_dir.path().to_path_buf()),
            admin_email: Some("   ".to_string()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert!(config.admin_email.is_none());
    }

    #[test]
    fn test_stale_threshold_must_exceed_heartbeat() {
        let temp_dir = make_temp_books_dir();
        let cli = CliConfig {
            books_data_path: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let file_config = FileConfig {
            jobs: Some(JobsConfig {
                heartbeat_interval_secs: Some(60),
                stale_job_threshold_secs: Some(60),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = AppConfig::resolve(&cli, Some(file_config)).unwrap_err();
        assert!(err.to_string().contains("stale_job_threshold_secs"));

        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.jobs.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.jobs.stale_job_threshold, Duration::from_secs(120));
    }
}
