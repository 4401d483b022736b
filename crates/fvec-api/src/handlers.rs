//! HTTP handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use fvec_models::{JobId, JobStatus, LogEntry, WorkItem};

use crate::error::{ApiError, ApiResult};
use crate::registry::spawn_job;
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

/// `POST /process` request body.
#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub items: Vec<WorkItem>,
}

/// `POST /process` response.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
}

/// `GET /status/{job_id}` response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    pub progress: u8,
    pub log_tail: Vec<String>,
}

/// `GET /jobs/{job_id}` response.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub status: JobStatus,
    pub items: Vec<WorkItem>,
    pub logs: Vec<LogEntry>,
    pub progress: u8,
    pub created_at: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /process
///
/// Validate the batch, register a pending job, and hand it to the scheduler.
/// Responds 202 with the job id; progress is polled via `/status`.
pub async fn process(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<(StatusCode, Json<ProcessResponse>)> {
    let max = state.config.pipeline.max_videos_per_request;
    if request.items.is_empty() {
        return Err(ApiError::bad_request("items must not be empty"));
    }
    if request.items.len() > max {
        return Err(ApiError::bad_request(format!(
            "items exceeds the limit of {} videos per request",
            max
        )));
    }

    let job_id = state.registry.create(request.items.clone()).await;
    info!("accepted job {} with {} items", job_id, request.items.len());

    spawn_job(state, job_id, request.items);

    Ok((StatusCode::ACCEPTED, Json(ProcessResponse { job_id })))
}

/// GET /status/{job_id}
///
/// Lightweight polling view: status, progress and the log tail.
pub async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let job_id = parse_job_id(&job_id)?;

    let (status, progress, log_tail) = state
        .registry
        .tail(job_id, state.config.log_tail_lines)
        .await
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    Ok(Json(StatusResponse {
        status,
        progress,
        log_tail,
    }))
}

/// GET /jobs/{job_id}
///
/// Full job view including items and the whole log buffer.
pub async fn job_detail(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job_id = parse_job_id(&job_id)?;

    let snapshot = state
        .registry
        .get(job_id)
        .await
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    Ok(Json(JobResponse {
        status: snapshot.job.status,
        items: snapshot.job.items,
        logs: snapshot.logs,
        progress: snapshot.job.progress,
        created_at: snapshot.job.created_at.to_rfc3339(),
    }))
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe). Unauthenticated.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub vector_store: CheckStatus,
    pub object_store: CheckStatus,
    pub metadata_store: CheckStatus,
    pub encoder: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
        }
    }

    fn skipped() -> Self {
        Self {
            status: "skipped".to_string(),
            error: None,
        }
    }
}

/// Readiness check endpoint: probes every external collaborator.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let vector_store = match state.vectors.check_connectivity().await {
        Ok(()) => CheckStatus::ok(),
        Err(e) => CheckStatus::error(e.to_string()),
    };

    let object_store = match state.store.check_connectivity().await {
        Ok(()) => CheckStatus::ok(),
        Err(e) => CheckStatus::error(e.to_string()),
    };

    let metadata_store = match &state.db {
        Some(db) => match db.check_connectivity().await {
            Ok(()) => CheckStatus::ok(),
            Err(e) => CheckStatus::error(e.to_string()),
        },
        None => CheckStatus::skipped(),
    };

    let encoder = match state.encoder.health_check().await {
        Ok(true) => CheckStatus::ok(),
        Ok(false) => CheckStatus::error("unhealthy"),
        Err(e) => CheckStatus::error(e.to_string()),
    };

    let all_ok = [&vector_store, &object_store, &metadata_store, &encoder]
        .iter()
        .all(|c| c.status != "error");

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            vector_store,
            object_store,
            metadata_store,
            encoder,
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    JobId::parse(raw).ok_or_else(|| ApiError::not_found("Job not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_id_rejects_garbage() {
        assert!(parse_job_id("not-a-uuid").is_err());
        assert!(parse_job_id("").is_err());
        assert!(parse_job_id("123e4567-e89b-12d3-a456-426614174000").is_ok());
    }

    #[test]
    fn test_process_response_field_name() {
        let response = ProcessResponse {
            job_id: JobId::new(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("jobId").is_some());
    }

    #[test]
    fn test_process_request_parses() {
        let request: ProcessRequest = serde_json::from_str(
            r#"{"items":[{"platform":"instagram","code":"ABC123"}]}"#,
        )
        .unwrap();
        assert_eq!(request.items.len(), 1);
        assert_eq!(request.items[0].code, "ABC123");
    }
}
