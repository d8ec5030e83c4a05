//! Scraping job handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use fomentos_common::db::models::{JobError, JobExecution, ResultSummary};
use fomentos_common::errors::{AppError, Result};
use fomentos_ingestion::sources::SourceTag;
use serde::{Deserialize, Serialize};

use super::{AuthUser, Pagination};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteParams {
    #[serde(default = "default_filter_by_date")]
    pub filter_by_date: bool,
}

fn default_filter_by_date() -> bool {
    true
}

#[derive(Serialize)]
pub struct JobExecuteResponse {
    pub job_id: String,
    pub message: String,
    pub status_url: String,
}

#[derive(Serialize)]
pub struct JobResponse {
    pub id: String,
    pub job_name: String,
    pub status: String,
    pub progress: f64,
    pub total: u32,
    pub processed: u32,
    pub failed_count: u32,
    pub errors: Vec<JobError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub created_at: String,
}

impl From<JobExecution> for JobResponse {
    fn from(job: JobExecution) -> Self {
        Self {
            id: job.id,
            job_name: job.job_name,
            status: job.status.as_str().to_string(),
            progress: job.progress,
            total: job.total,
            processed: job.processed,
            failed_count: job.failed_count,
            errors: job.errors,
            result_summary: job.result_summary,
            started_at: job.started_at.map(|dt| dt.to_rfc3339()),
            finished_at: job.finished_at.map(|dt| dt.to_rfc3339()),
            created_at: job.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub total: usize,
}

/// Start a manual run for one source
pub async fn execute_job(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(source): Path<String>,
    Query(params): Query<ExecuteParams>,
) -> Result<(StatusCode, Json<JobExecuteResponse>)> {
    let tag = SourceTag::parse(&source).ok_or_else(|| AppError::NotFound {
        resource_type: "source".to_string(),
        id: source.clone(),
    })?;

    let job_id = state
        .orchestrator
        .clone()
        .execute_now(tag, params.filter_by_date)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobExecuteResponse {
            status_url: format!("/api/v1/jobs/{}", job_id),
            message: format!(
                "Job {} iniciado com sucesso (filter_by_date={})",
                tag.origem(),
                params.filter_by_date
            ),
            job_id,
        }),
    ))
}

/// Job status snapshot
pub async fn get_job(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>> {
    let job = state
        .repo
        .find_job_by_id(&id)
        .await?
        .ok_or_else(|| AppError::JobNotFound { id })?;

    Ok(Json(JobResponse::from(job)))
}

/// Execution history, newest first
pub async fn list_jobs(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<JobListResponse>> {
    let jobs = state
        .repo
        .list_jobs(pagination.skip, pagination.limit)
        .await?;

    let jobs: Vec<JobResponse> = jobs.into_iter().map(JobResponse::from).collect();
    Ok(Json(JobListResponse {
        total: jobs.len(),
        jobs,
    }))
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub message: String,
}

/// Cooperative cancel: only running jobs can be cancelled
pub async fn cancel_job(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>> {
    if !state.orchestrator.cancel(&id) {
        return Err(AppError::JobNotFound { id });
    }

    Ok(Json(CancelResponse {
        message: "Job cancelado com sucesso".to_string(),
    }))
}
