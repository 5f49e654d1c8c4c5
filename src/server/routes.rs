//! HTTP surface of the async evaluation path

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::{debug, error};

use crate::error::{CheckError, Result};
use crate::image::{Image, tag_version};
use crate::server::AppState;
use crate::version::constraint::RangeConstraint;
use crate::version::evaluation::{CheckRequest, Evaluation, StoredEvaluation, build_evaluation};
use crate::version::semver::tags_to_versions;

pub const CHECK_PATH: &str = "/api/v1/check";
pub const JOBS_PATH: &str = "/api/v1/jobs";
pub const EVALUATIONS_PATH: &str = "/api/v1/evaluations";

pub fn job_location(id: &str) -> String {
    format!("{}/{}", JOBS_PATH, id)
}

pub fn evaluation_location(id: &str) -> String {
    format!("{}/{}", EVALUATIONS_PATH, id)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CHECK_PATH, get(check))
        .route(&format!("{}/{{id}}", JOBS_PATH), get(job_status))
        .route(&format!("{}/{{id}}", EVALUATIONS_PATH), get(evaluation))
        .route("/healthz", get(health))
        .with_state(state)
}

/// Error body `{"error": "..."}` with a matching status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: u16, message: String) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message,
        }
    }
}

impl From<CheckError> for ApiError {
    fn from(e: CheckError) -> Self {
        let status = e.status_code();
        if e.is_server_error() {
            error!("Request failed: {}", e);
        } else {
            debug!("Request rejected with {}: {}", status, e);
        }
        Self::new(status, e.to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// What a check request resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Tags were cached, the evaluation was computed on the spot
    Ready(Evaluation),
    /// Tags must be fetched; poll the job with this id
    Accepted(String),
}

/// Validate the request, then either evaluate from cached tags or enqueue a job.
///
/// A cache hit never creates a job.
pub fn resolve_check(state: &AppState, request: CheckRequest) -> Result<CheckOutcome> {
    let image = Image::parse(&request.image, &request.tag_prefix)?;
    tag_version(&image)?;
    let range = RangeConstraint::parse(&request.constraint)?;

    match state.storer.get_tags(&image)? {
        Some(versions) => {
            debug!(image = %image, "Tags cache hit");
            // Cached versions are already stripped of the prefix
            let candidates = tags_to_versions(&versions, "", true)?;
            Ok(CheckOutcome::Ready(build_evaluation(
                &image,
                &range,
                &candidates,
            )?))
        }
        None => {
            let id = state.queue.add_job(state.storer.as_ref(), request)?;
            Ok(CheckOutcome::Accepted(id))
        }
    }
}

async fn check(
    State(state): State<AppState>,
    query: std::result::Result<Query<CheckRequest>, QueryRejection>,
) -> std::result::Result<Response, ApiError> {
    let Query(request) = query?;
    debug!(
        image = %request.image,
        constraint = %request.constraint,
        tag_prefix = %request.tag_prefix,
        "GET {}",
        CHECK_PATH
    );

    match resolve_check(&state, request)? {
        CheckOutcome::Ready(evaluation) => Ok((StatusCode::OK, Json(evaluation)).into_response()),
        CheckOutcome::Accepted(id) => Ok((
            StatusCode::ACCEPTED,
            [(LOCATION, job_location(&id))],
            Json(json!({ "id": id })),
        )
            .into_response()),
    }
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    debug!(id = %id, "GET {}/{{id}}", JOBS_PATH);

    if state.storer.get_evaluation(&id).map_err(CheckError::from)?.is_some() {
        return Ok(Redirect::to(&evaluation_location(&id)).into_response());
    }

    if state.storer.is_job_queued(&id).map_err(CheckError::from)? {
        return Ok((StatusCode::OK, Json(json!({ "status": "pending" }))).into_response());
    }

    Err(CheckError::JobNotFound(id).into())
}

async fn evaluation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    debug!(id = %id, "GET {}/{{id}}", EVALUATIONS_PATH);

    match state.storer.get_evaluation(&id).map_err(CheckError::from)? {
        Some(StoredEvaluation::Success(evaluation)) => {
            Ok((StatusCode::OK, Json(evaluation)).into_response())
        }
        Some(StoredEvaluation::Failure(failure)) => {
            Err(ApiError::new(failure.status, failure.error))
        }
        None => Err(CheckError::EvaluationExpired(id).into()),
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.storer.ping() {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            error!("Health check failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "cache unavailable")
        }
    }
}
