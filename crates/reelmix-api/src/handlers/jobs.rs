//! Job submission and status handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

use reelmix_models::{Job, JobId, JobParameters, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Acknowledgment returned by a submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Where to poll for the job snapshot
    pub status_url: String,
}

/// POST /api/jobs
///
/// Accepts a composite job and returns immediately.
///
/// Returns:
/// - 202: Job accepted
/// - 400: A required asset reference is missing (code `MissingInput`)
pub async fn submit_job(
    State(state): State<AppState>,
    Json(parameters): Json<JobParameters>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    let job_id = state.orchestrator.submit(parameters).await?;
    info!(job_id = %job_id, "Job accepted");

    let status_url = state.config.status_url(job_id.as_str());
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id,
            status: JobStatus::Queued,
            status_url,
        }),
    ))
}

/// GET /api/jobs/:job_id
///
/// Returns:
/// - 200: Current job snapshot
/// - 400: Malformed job id
/// - 404: Job not found
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    if !is_valid_job_id(&job_id) {
        return Err(ApiError::bad_request("Invalid job ID format"));
    }

    let job = state
        .orchestrator
        .get_status(&JobId::from_string(job_id))
        .await?;
    Ok(Json(job))
}

/// Job IDs are short alphanumeric tokens.
fn is_valid_job_id(job_id: &str) -> bool {
    !job_id.is_empty()
        && job_id.len() <= 64
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_job_id() {
        assert!(is_valid_job_id(JobId::new().as_str()));
        assert!(is_valid_job_id("abc-123_x"));
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("../etc/passwd"));
        assert!(!is_valid_job_id(&"a".repeat(65)));
    }
}
