//! API routes for livedatad
//!
//! Errors are returned as `{kind, code, message}` with a status derived from
//! the error kind. Live queries are prepared (resolved and rendered) inside
//! the request, so bad input is rejected before anything is queued.

use crate::server::AppState;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use livedata_common::api::{CleanupRequestBody, HealthResponse, JobAccepted, QueryRequestBody};
use livedata_common::error::LivedataError;
use livedata_common::job::{prepare, LiveQueryRequest, RequestMetadata};
use livedata_common::resolver::resolve_raw;
use livedata_common::result_store::{JobRegistry, JobResultRecord, ResultStore};
use livedata_common::sweeper::RetentionPolicy;
use livedata_common::types::{ManagedDeviceSummary, ObjectReference};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

type AppStateArc = Arc<AppState>;

/// Header carrying the authenticated caller, set by the fronting proxy
pub const CALLER_HEADER: &str = "x-remote-user";

pub struct ApiError(pub LivedataError);

impl From<LivedataError> for ApiError {
    fn from(err: LivedataError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &LivedataError) -> StatusCode {
    match err {
        LivedataError::InvalidObjectType(_)
        | LivedataError::NoManagementAddress { .. }
        | LivedataError::NotActive { .. }
        | LivedataError::MissingCommandSource { .. }
        | LivedataError::UndefinedVariable { .. }
        | LivedataError::TemplateSyntax { .. }
        | LivedataError::InvalidPolicy(_) => StatusCode::BAD_REQUEST,
        LivedataError::NotFound { .. } => StatusCode::NOT_FOUND,
        LivedataError::JobDisabled(_) => StatusCode::SERVICE_UNAVAILABLE,
        LivedataError::ConnectionError { .. } | LivedataError::CommandExecutionError { .. } => {
            StatusCode::BAD_GATEWAY
        }
        LivedataError::TimeLimitExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        LivedataError::Config(_) | LivedataError::Storage(_) | LivedataError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (status, Json(self.0.to_failure())).into_response()
    }
}

// ============================================================================
// Health
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Result<Json<HealthResponse>, ApiError> {
    let jobs = &state.config.jobs;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        devices: state.directory.device_count(),
        query_job_enabled: state.store.is_enabled(&jobs.query_job_name)?,
        cleanup_job_enabled: state.store.is_enabled(&jobs.cleanup_job_name)?,
    }))
}

// ============================================================================
// Managed device lookup
// ============================================================================

pub fn managed_device_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/managed-device/:object_type/:id", get(managed_device))
}

async fn managed_device(
    State(state): State<AppStateArc>,
    Path((object_type, id)): Path<(String, String)>,
) -> Result<Json<ManagedDeviceSummary>, ApiError> {
    let context = resolve_raw(state.directory.as_ref(), &object_type, &id)?;
    Ok(Json(context.summary()))
}

// ============================================================================
// Jobs
// ============================================================================

pub fn job_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/query/:object_type/:id", post(submit_query))
        .route("/v1/jobs/:id", get(get_job))
        .route("/v1/cleanup", post(submit_cleanup))
}

fn request_metadata(headers: &HeaderMap, peer: Option<SocketAddr>) -> RequestMetadata {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    RequestMetadata {
        caller: header(CALLER_HEADER),
        remote_addr: peer.map(|addr| addr.ip().to_string()),
        x_forwarded_for: header("x-forwarded-for"),
    }
}

async fn submit_query(
    State(state): State<AppStateArc>,
    Path((object_type, id)): Path<(String, String)>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<QueryRequestBody>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let request = LiveQueryRequest {
        reference: ObjectReference::parse(&object_type, &id)?,
        filter: body.filter,
        metadata: request_metadata(&headers, connect_info.map(|ConnectInfo(addr)| addr)),
    };

    let prepared = prepare(state.directory.as_ref(), &request, Utc::now())?;
    let job_id = state.queue.submit_query(prepared, request.filter).await?;
    info!("Accepted live query {} for {} {}", job_id, object_type, id);

    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

async fn get_job(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<JobResultRecord>, ApiError> {
    let not_found = || LivedataError::NotFound {
        kind: "Job",
        id: id.clone(),
    };
    let uuid = Uuid::parse_str(&id).map_err(|_| not_found())?;
    let record = state.store.get(&uuid)?.ok_or_else(not_found)?;
    Ok(Json(record))
}

async fn submit_cleanup(
    State(state): State<AppStateArc>,
    Json(body): Json<CleanupRequestBody>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let policy = RetentionPolicy::new(
        body.days_to_keep
            .unwrap_or(state.config.retention.days_to_keep),
        body.dry_run.unwrap_or(false),
    )?;
    let job_id = state.queue.submit_cleanup(policy).await?;
    info!(
        "Accepted cleanup job {} (days_to_keep={}, dry_run={})",
        job_id, policy.days_to_keep, policy.dry_run
    );
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}
