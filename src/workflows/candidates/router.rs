use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::arbitration::ArbitrationDecision;
use super::domain::CandidateId;
use super::import::{CandidateCsvImporter, ImportSummary};
use super::normalizer::{IdentitySource, RawSubmission};
use super::report::SubmissionOutcome;
use super::service::{CandidateIntakeService, IntakeError};
use super::store::CandidateStore;
use crate::error::AppError;

/// Body of `POST /api/v1/candidates`.
///
/// Omitting `decision` asks the server to report a probable duplicate instead of
/// deciding on the operator's behalf.
#[derive(Debug, Deserialize)]
pub struct SubmitCandidateRequest {
    pub submission: RawSubmission,
    #[serde(default)]
    pub decision: Option<ArbitrationDecision>,
}

#[derive(Debug, Deserialize)]
pub struct ImportCandidatesRequest {
    pub csv: String,
    #[serde(default = "default_on_match")]
    pub on_match: ArbitrationDecision,
}

fn default_on_match() -> ArbitrationDecision {
    ArbitrationDecision::Decline
}

/// Router builder exposing candidate intake endpoints.
pub fn candidate_router<S, I>(service: Arc<CandidateIntakeService<S, I>>) -> Router
where
    S: CandidateStore + 'static,
    I: IdentitySource + 'static,
{
    Router::new()
        .route("/api/v1/candidates", post(submit_handler::<S, I>))
        .route("/api/v1/candidates/import", post(import_handler::<S, I>))
        .route(
            "/api/v1/candidates/:candidate_id",
            get(fetch_handler::<S, I>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<S, I>(
    State(service): State<Arc<CandidateIntakeService<S, I>>>,
    Json(request): Json<SubmitCandidateRequest>,
) -> Response
where
    S: CandidateStore + 'static,
    I: IdentitySource + 'static,
{
    let staged = match service.stage(request.submission) {
        Ok(staged) => staged,
        Err(err) => return failure_response(&err),
    };

    if request.decision.is_none() {
        if let Some(prompt) = staged.conflict() {
            let payload = json!({
                "status": "confirmation_required",
                "prompt": prompt.message,
                "matched_record_id": prompt.matched_record_id,
                "matched_on": prompt.matched_on,
            });
            return (StatusCode::CONFLICT, Json(payload)).into_response();
        }
    }

    let outcome = service.commit(staged, request.decision);
    let status = match &outcome {
        SubmissionOutcome::Created(_) => StatusCode::CREATED,
        SubmissionOutcome::Updated(_) | SubmissionOutcome::Cancelled => StatusCode::OK,
        SubmissionOutcome::Failed(err) => failure_status(err),
    };
    (status, Json(outcome.view())).into_response()
}

pub(crate) async fn fetch_handler<S, I>(
    State(service): State<Arc<CandidateIntakeService<S, I>>>,
    Path(candidate_id): Path<String>,
) -> Response
where
    S: CandidateStore + 'static,
    I: IdentitySource + 'static,
{
    match service.get(&CandidateId(candidate_id)) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => failure_response(&err),
    }
}

pub(crate) async fn import_handler<S, I>(
    State(service): State<Arc<CandidateIntakeService<S, I>>>,
    Json(request): Json<ImportCandidatesRequest>,
) -> Result<Json<ImportSummary>, AppError>
where
    S: CandidateStore + 'static,
    I: IdentitySource + 'static,
{
    let summary = tokio::task::spawn_blocking(move || {
        let reader = Cursor::new(request.csv.into_bytes());
        CandidateCsvImporter::from_reader(reader, service.as_ref(), request.on_match)
    })
    .await??;
    Ok(Json(summary))
}

fn failure_status(err: &IntakeError) -> StatusCode {
    match err {
        IntakeError::NotFound { .. } => StatusCode::NOT_FOUND,
        IntakeError::ArbitrationRequired { .. } => StatusCode::CONFLICT,
        IntakeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure_response(err: &IntakeError) -> Response {
    let payload = json!({
        "status": "failed",
        "error": err.to_string(),
    });
    (failure_status(err), Json(payload)).into_response()
}
