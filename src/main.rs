use anyhow::{bail, Context, Result};
use bibliotheca_server::background_jobs::{EngineComponents, JobEngine, LoggingJobNotifier};
use bibliotheca_server::catalog_source::InpxCatalogSource;
use bibliotheca_server::config::{AppConfig, CliConfig, FileConfig};
use bibliotheca_server::dispatch::{build_runtime, Dispatchers};
use bibliotheca_server::library_store::{
    Job, JobId, JobStatus, SqliteBookStore, SqliteJobStore, LIBRARY_VERSIONED_SCHEMAS,
};
use bibliotheca_server::metrics;
use bibliotheca_server::sqlite_persistence::TransactionManager;
use bibliotheca_server::user::{AdminEmailAuthorizer, CallerIdentity, UserStatus};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(version = VERSION, about = "Ebook library import jobs")]
struct CliArgs {
    /// Path to a TOML config file. Its values override command line options.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite library database. Defaults to a file in the books directory.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Directory holding the INPX index and the FB2 archives.
    #[clap(long, value_parser = parse_path)]
    pub books_path: Option<PathBuf>,

    /// Name of the INPX index inside the books directory.
    #[clap(long)]
    pub inpx_file_name: Option<String>,

    /// Email of the library administrator.
    #[clap(long)]
    pub admin_email: Option<String>,

    /// Maximum number of open database connections.
    #[clap(long)]
    pub pool_size: Option<u32>,

    /// Archives processed at the same time by one job.
    #[clap(long)]
    pub archive_parallelism: Option<usize>,

    /// Email of the caller. Defaults to the admin email.
    #[clap(long)]
    pub as_user: Option<String>,

    /// Account status of the caller.
    #[clap(long, default_value = "APPROVED")]
    pub user_status: UserStatus,

    /// Print the collected metrics before exiting.
    #[clap(long)]
    pub print_metrics: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import book metadata from the INPX index.
    Import {
        /// Extract covers once the import has finished.
        #[clap(long)]
        extract_covers: bool,
    },
    /// Extract cover images from the FB2 archives.
    ExtractCovers,
    /// Show recorded jobs.
    Jobs {
        /// Show a single job.
        #[clap(long)]
        id: Option<i64>,
    },
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            books_data_path: self.books_path.clone(),
            inpx_file_name: self.inpx_file_name.clone(),
            admin_email: self.admin_email.clone(),
            pool_size: self.pool_size,
            archive_parallelism: self.archive_parallelism,
        }
    }
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    let runtime = build_runtime(&config.concurrency).context("Failed to build tokio runtime")?;
    runtime.block_on(run(cli_args, config))
}

async fn run(cli_args: CliArgs, config: AppConfig) -> Result<()> {
    info!("Bibliotheca {}", VERSION);
    metrics::init_metrics();

    let dispatchers = Dispatchers::current(config.concurrency.compute_threads)?;

    info!("Opening library database at {:?}...", config.db_path);
    let db_path = config.db_path.clone();
    let database = config.database.clone();
    let transactions = dispatchers
        .run_blocking(move || TransactionManager::open(db_path, &database, LIBRARY_VERSIONED_SCHEMAS))
        .await??;

    let engine = JobEngine::new(EngineComponents {
        transactions: Arc::new(transactions),
        job_store: Arc::new(SqliteJobStore::new()),
        book_store: Arc::new(SqliteBookStore::new()),
        source: Arc::new(InpxCatalogSource::new(
            &config.books_data_path,
            &config.inpx_file_name,
        )),
        authorizer: Arc::new(AdminEmailAuthorizer::new(config.admin_email.clone())),
        notifier: Arc::new(LoggingJobNotifier),
        dispatchers,
        settings: config.jobs.clone(),
    });

    let caller = CallerIdentity::new(
        cli_args
            .as_user
            .or_else(|| config.admin_email.clone())
            .unwrap_or_default(),
        cli_args.user_status,
    );

    match cli_args.command {
        Command::Import { extract_covers } => {
            engine.recover_interrupted_jobs().await?;
            let id = engine.start_data_import(&caller, extract_covers).await?;
            report_runs(&follow_jobs(&engine, &caller, id).await?)?;
        }
        Command::ExtractCovers => {
            engine.recover_interrupted_jobs().await?;
            let id = engine.start_cover_extraction(&caller).await?;
            report_runs(&follow_jobs(&engine, &caller, id).await?)?;
        }
        Command::Jobs { id: Some(id) } => match engine.get_job(&caller, id).await? {
            Some(job) => print_json(&job)?,
            None => bail!("Job {} not found", id),
        },
        Command::Jobs { id: None } => print_json(&engine.get_all_jobs(&caller).await?)?,
    }

    if cli_args.print_metrics {
        println!("{}", metrics::gather_metrics());
    }
    Ok(())
}

fn create_spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")?,
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Polls progress until the started job and its follow-ups are done.
/// Returns those jobs, oldest first.
async fn follow_jobs(engine: &JobEngine, caller: &CallerIdentity, first: JobId) -> Result<Vec<Job>> {
    let spinner = create_spinner(&format!("Job {} started", first))?;
    let idle = engine.wait_idle();
    tokio::pin!(idle);
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = &mut idle => break,
            _ = ticker.tick() => {
                let jobs = engine.get_all_jobs(caller).await?;
                if let Some(job) = jobs.iter().find(|job| !job.status.is_terminal()) {
                    spinner.set_message(format!(
                        "Job {} ({}): {}",
                        job.id, job.job_type, job.progress
                    ));
                }
            }
        }
    }
    spinner.finish_and_clear();

    let mut jobs: Vec<Job> = engine
        .get_all_jobs(caller)
        .await?
        .into_iter()
        .filter(|job| job.id >= first)
        .collect();
    jobs.reverse();
    Ok(jobs)
}

fn report_runs(jobs: &[Job]) -> Result<()> {
    print_json(&jobs)?;
    if let Some(failed) = jobs.iter().find(|job| job.status == JobStatus::Failed) {
        bail!(
            "Job {} failed: {}",
            failed.id,
            failed.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
