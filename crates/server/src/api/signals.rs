//! Process-wide flags consulted by running jobs.

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use trove_core::connectivity::SignalsSnapshot;

use crate::state::AppState;

/// Partial update; omitted flags keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSignalsBody {
    pub offline: Option<bool>,
    pub playback_active: Option<bool>,
}

pub async fn get_signals(State(state): State<Arc<AppState>>) -> Json<SignalsSnapshot> {
    Json(state.flags().snapshot())
}

pub async fn update_signals(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpdateSignalsBody>,
) -> Json<SignalsSnapshot> {
    let flags = state.flags();
    if let Some(offline) = body.offline {
        info!(offline = offline, "Connectivity flag updated");
        flags.set_offline(offline);
    }
    if let Some(active) = body.playback_active {
        info!(playback_active = active, "Playback flag updated");
        flags.set_playback_active(active);
    }
    Json(flags.snapshot())
}
