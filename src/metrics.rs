use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Bibliotheca metrics
const PREFIX: &str = "bibliotheca";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Job lifecycle
    pub static ref JOBS_STARTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_started_total"), "Total number of jobs started"),
        &["job_type"]
    ).expect("Failed to create jobs_started_total metric");

    pub static ref JOBS_FINISHED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_finished_total"), "Total number of jobs that reached a terminal state"),
        &["job_type", "status"]
    ).expect("Failed to create jobs_finished_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Job run duration in seconds"
        )
        .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]),
        &["job_type"]
    ).expect("Failed to create job_duration_seconds metric");

    pub static ref JOBS_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_jobs_running"), "Jobs currently running"),
        &["job_type"]
    ).expect("Failed to create jobs_running metric");

    // Persistence
    pub static ref TRANSACTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_transactions_total"), "Database transactions by outcome"),
        &["kind", "outcome"]
    ).expect("Failed to create transactions_total metric");

    pub static ref TRANSACTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_transaction_duration_seconds"),
            "Database transaction duration in seconds, including pool wait"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["kind"]
    ).expect("Failed to create transaction_duration_seconds metric");
}

/// Register all metrics with the registry. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(JOBS_STARTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_FINISHED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(TRANSACTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TRANSACTION_DURATION_SECONDS.clone()));

    tracing::debug!("Metrics registered");
}

pub fn record_job_started(job_type: &str) {
    JOBS_STARTED_TOTAL.with_label_values(&[job_type]).inc();
    JOBS_RUNNING.with_label_values(&[job_type]).inc();
}

pub fn record_job_finished(job_type: &str, status: &str, duration: Duration) {
    JOBS_FINISHED_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration.as_secs_f64());
    JOBS_RUNNING.with_label_values(&[job_type]).dec();
}

pub fn record_transaction(kind: &str, outcome: &str, duration: Duration) {
    TRANSACTIONS_TOTAL.with_label_values(&[kind, outcome]).inc();
    TRANSACTION_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(duration.as_secs_f64());
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
