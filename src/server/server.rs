use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::metrics::metrics_handler;
use super::websocket::live_ws_handler;
use super::{log_requests, state::*, ServerConfig};
use crate::jobs::{JobError, JobRegistry, JobSpec, RunLookup};
use crate::notifications::LiveChannel;

#[derive(Serialize)]
struct ServerStats {
    pub status: &'static str,
    pub version: &'static str,
    pub hash: &'static str,
    pub uptime: String,
    pub jobs: usize,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct RemovedBody {
    id: String,
}

#[derive(Deserialize)]
struct JobIds {
    ids: Vec<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn job_error_response(error: JobError) -> Response {
    let status = match &error {
        JobError::JobNotFound(_) => StatusCode::NOT_FOUND,
        JobError::ImageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        JobError::Execution(_) | JobError::Persistence(_) | JobError::Notification(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        warn!("Request failed: {}", error);
    }
    error_response(status, error.to_string())
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        hash: env!("GIT_HASH"),
        uptime: format_uptime(state.start_time.elapsed()),
        jobs: state.registry.list_jobs().len(),
    })
}

async fn list_jobs(State(registry): State<GuardedJobRegistry>) -> Response {
    let jobs: Vec<_> = registry.list_jobs().iter().map(|j| j.snapshot()).collect();
    Json(jobs).into_response()
}

async fn create_job(
    State(state): State<ServerState>,
    Json(spec): Json<JobSpec>,
) -> Response {
    if let Err(e) = spec.validate(state.config.min_run_frequency) {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }
    let job = state.registry.add_job(spec);
    (StatusCode::CREATED, Json(job.snapshot())).into_response()
}

async fn get_job(
    State(registry): State<GuardedJobRegistry>,
    Path(id): Path<String>,
) -> Response {
    match registry.get_job(&id) {
        Some(job) => Json(job.snapshot()).into_response(),
        None => job_error_response(JobError::JobNotFound(id)),
    }
}

async fn start_job(
    State(registry): State<GuardedJobRegistry>,
    Path(id): Path<String>,
) -> Response {
    match registry.start_job(&id).await {
        Ok(job) => Json(job.snapshot()).into_response(),
        Err(e) => job_error_response(e),
    }
}

async fn stop_job(
    State(registry): State<GuardedJobRegistry>,
    Path(id): Path<String>,
) -> Response {
    match registry.stop_job(&id) {
        Ok(job) => Json(job.snapshot()).into_response(),
        Err(e) => job_error_response(e),
    }
}

async fn remove_job(
    State(registry): State<GuardedJobRegistry>,
    Path(id): Path<String>,
) -> Response {
    match registry.remove_job(&id).await {
        Ok(id) => Json(RemovedBody { id }).into_response(),
        Err(e) => job_error_response(e),
    }
}

async fn start_all(State(registry): State<GuardedJobRegistry>) -> Response {
    Json(registry.start_all().await).into_response()
}

async fn stop_all(State(registry): State<GuardedJobRegistry>) -> Response {
    Json(registry.stop_all()).into_response()
}

async fn remove_all(State(registry): State<GuardedJobRegistry>) -> Response {
    Json(registry.remove_all().await).into_response()
}

async fn start_listed(
    State(registry): State<GuardedJobRegistry>,
    Json(body): Json<JobIds>,
) -> Response {
    Json(registry.start_jobs(&body.ids).await).into_response()
}

async fn stop_listed(
    State(registry): State<GuardedJobRegistry>,
    Json(body): Json<JobIds>,
) -> Response {
    Json(registry.stop_jobs(&body.ids)).into_response()
}

async fn remove_listed(
    State(registry): State<GuardedJobRegistry>,
    Json(body): Json<JobIds>,
) -> Response {
    Json(registry.remove_jobs(&body.ids).await).into_response()
}

async fn get_run(
    State(registry): State<GuardedJobRegistry>,
    Path((id, run_number)): Path<(String, u64)>,
) -> Response {
    match registry.fetch_run(&id, run_number).await {
        Ok(RunLookup::Completed(records)) => Json(records).into_response(),
        Ok(RunLookup::NotYetRun) => error_response(
            StatusCode::CONFLICT,
            format!("Run {} has not completed yet", run_number),
        ),
        Err(e) => job_error_response(e),
    }
}

async fn get_job_events(
    State(registry): State<GuardedJobRegistry>,
    Path(id): Path<String>,
) -> Response {
    match registry.get_job(&id) {
        Some(job) => Json(job.events()).into_response(),
        None => job_error_response(JobError::JobNotFound(id)),
    }
}

pub fn make_app(
    config: ServerConfig,
    registry: Arc<JobRegistry>,
    live: Arc<LiveChannel>,
) -> Router {
    let state = ServerState::new(config, registry, live);

    let job_routes: Router = Router::new()
        .route("/", get(list_jobs).post(create_job).delete(remove_all))
        .route("/start", post(start_all))
        .route("/stop", post(stop_all))
        .route("/start/ids", post(start_listed))
        .route("/stop/ids", post(stop_listed))
        .route("/remove/ids", post(remove_listed))
        .route("/{id}", get(get_job).delete(remove_job))
        .route("/{id}/start", post(start_job))
        .route("/{id}/stop", post(stop_job))
        .route("/{id}/runs/{run_number}", get(get_run))
        .route("/{id}/events", get(get_job_events))
        .route("/{id}/live", get(live_ws_handler))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone())
        .nest("/v1/jobs", job_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(
    config: ServerConfig,
    registry: Arc<JobRegistry>,
    live: Arc<LiveChannel>,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, registry, live);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
