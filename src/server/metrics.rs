use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::future::Future;
use std::time::{Duration, Instant};

/// Metric name prefix for all orchestrator metrics
const PREFIX: &str = "scrape_orchestrator";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Job Metrics
    pub static ref JOB_TICKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_ticks_total"), "Job ticks by outcome"),
        &["outcome"]
    ).expect("Failed to create job_ticks_total metric");

    pub static ref SANDBOX_RUN_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_sandbox_run_duration_seconds"),
            "Sandbox run duration in seconds"
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["status"]
    ).expect("Failed to create sandbox_run_duration_seconds metric");

    pub static ref OPERATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_operation_duration_seconds"),
            "Duration of job operations in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["operation"]
    ).expect("Failed to create operation_duration_seconds metric");

    pub static ref SCHEDULED_JOBS: Gauge = Gauge::new(
        format!("{PREFIX}_scheduled_jobs"),
        "Number of jobs with a live scheduling loop"
    ).expect("Failed to create scheduled_jobs metric");

    pub static ref NEW_RECORDS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_new_records_total"), "Records reported as new"),
        &["job_id"]
    ).expect("Failed to create new_records_total metric");

    pub static ref DIGESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_digests_total"), "Digest deliveries by channel"),
        &["channel", "status"]
    ).expect("Failed to create digests_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOB_TICKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SANDBOX_RUN_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(OPERATION_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SCHEDULED_JOBS.clone()));
    let _ = REGISTRY.register(Box::new(NEW_RECORDS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DIGESTS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Collapse a request path into a low-cardinality endpoint label.
pub fn categorize_endpoint(path: &str) -> &'static str {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["health"] => "health",
        ["metrics"] => "metrics",
        ["v1", "jobs"] => "jobs",
        ["v1", "jobs", "start" | "stop"] => "jobs_bulk",
        ["v1", "jobs", "start" | "stop" | "remove", "ids"] => "jobs_bulk",
        ["v1", "jobs", _] => "job",
        ["v1", "jobs", _, "start" | "stop"] => "job_control",
        ["v1", "jobs", _, "runs", _] => "job_run",
        ["v1", "jobs", _, "events"] => "job_events",
        ["v1", "jobs", _, "live"] => "job_live",
        _ => "other",
    }
}

/// Record an HTTP request
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

/// Record the outcome of one job tick
pub fn record_tick(outcome: &str) {
    JOB_TICKS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a finished sandbox run
pub fn record_sandbox_run(success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    SANDBOX_RUN_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration.as_secs_f64());
}

pub fn record_new_records(job_id: &str, count: usize) {
    NEW_RECORDS_TOTAL
        .with_label_values(&[job_id])
        .inc_by(count as f64);
}

/// Drop the per-job series of a removed job
pub fn forget_job(job_id: &str) {
    let _ = NEW_RECORDS_TOTAL.remove_label_values(&[job_id]);
}

pub fn record_digest(channel: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    DIGESTS_TOTAL.with_label_values(&[channel, status]).inc();
}

pub fn inc_scheduled_jobs() {
    SCHEDULED_JOBS.inc();
}

pub fn dec_scheduled_jobs() {
    SCHEDULED_JOBS.dec();
}

/// Await `fut`, recording how long it took under `operation`.
///
/// The job id is only used for the debug trace, to keep label cardinality low.
pub async fn timed<F, T>(operation: &str, job_id: &str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let output = fut.await;
    let elapsed = start.elapsed();
    OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(elapsed.as_secs_f64());
    tracing::debug!("{} for job {} took {:?}", operation, job_id, elapsed);
    output
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
