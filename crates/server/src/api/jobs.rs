//! Batch job API handlers, one set per job kind.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use trove_core::orchestrator::{InputPreview, RunStatus, StartRequest};
use trove_core::store::JobKind;

use super::error::{ApiError, MessageResponse};
use crate::state::AppState;

/// Request body for previewing an input file
#[derive(Debug, Deserialize)]
pub struct PreviewBody {
    pub source: String,
}

fn parse_job(job: &str) -> Result<JobKind, ApiError> {
    JobKind::from_str(job).map_err(|_| ApiError::not_found(format!("Unknown job: {}", job)))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(job): Path<String>,
) -> Result<Json<RunStatus>, ApiError> {
    let kind = parse_job(&job)?;
    Ok(Json(state.job(kind).status()))
}

/// Start a fresh run, or resume the saved one when `resume` is set.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(job): Path<String>,
    Json(body): Json<StartRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let kind = parse_job(&job)?;
    let resume = body.resume;
    state.job(kind).start(body).await?;

    info!(job = %kind, resume = resume, "Run started via API");
    let message = if resume {
        format!("{} batch resumed", kind)
    } else {
        format!("{} batch started", kind)
    };
    Ok((StatusCode::ACCEPTED, MessageResponse::new(message)))
}

pub async fn stop(
    State(state): State<Arc<AppState>>,
    Path(job): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let kind = parse_job(&job)?;
    state.job(kind).stop()?;
    Ok(MessageResponse::new(format!("{} batch stopping", kind)))
}

pub async fn reset(
    State(state): State<Arc<AppState>>,
    Path(job): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let kind = parse_job(&job)?;
    state.job(kind).reset()?;
    Ok(MessageResponse::new(format!("{} batch reset", kind)))
}

/// Parse an input file without starting a run.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Path(job): Path<String>,
    Json(body): Json<PreviewBody>,
) -> Result<Json<InputPreview>, ApiError> {
    let kind = parse_job(&job)?;
    let preview = state.job(kind).preview_input(&body.source).await?;
    Ok(Json(preview))
}
