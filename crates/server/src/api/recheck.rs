//! Recheck scheduler handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use trove_core::orchestrator::{RecheckError, RecheckStatus};

use super::error::{ApiError, MessageResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RunNowResponse {
    /// False when a pass was already in progress.
    pub triggered: bool,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<RecheckStatus> {
    Json(state.recheck().status())
}

pub async fn start(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.recheck().start() {
        return Err(ApiError::conflict("Recheck scheduler already running"));
    }
    Ok(MessageResponse::new("Recheck scheduler started"))
}

pub async fn stop(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.recheck().stop() {
        return Err(ApiError::conflict("Recheck scheduler is not running"));
    }
    Ok(MessageResponse::new("Recheck scheduler stopped"))
}

pub async fn run_now(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RunNowResponse>, ApiError> {
    match state.recheck().run_now() {
        Ok(triggered) => Ok(Json(RunNowResponse { triggered })),
        Err(e @ RecheckError::NotRunning) => Err(ApiError::conflict(e.to_string())),
    }
}
