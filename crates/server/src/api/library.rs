//! Reading list and association handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trove_core::store::{Association, AssociationStore, ReadingListEntry, ReadingListStore};

use super::error::ApiError;
use crate::state::AppState;

/// Request body for adding to the reading list
#[derive(Debug, Deserialize)]
pub struct AddReadingListBody {
    pub media_id: u64,
}

#[derive(Debug, Serialize)]
pub struct AddReadingListResponse {
    pub media_id: u64,
    /// False when the series was already on the list.
    pub added: bool,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

pub async fn list_reading_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ReadingListEntry>>, ApiError> {
    Ok(Json(state.store().reading_list()?))
}

pub async fn add_to_reading_list(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddReadingListBody>,
) -> Result<(StatusCode, Json<AddReadingListResponse>), ApiError> {
    if body.media_id == 0 {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "media_id must be positive"));
    }
    let added = state.store().add_to_reading_list(body.media_id)?;
    let status = if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(AddReadingListResponse {
            media_id: body.media_id,
            added,
        }),
    ))
}

pub async fn remove_from_reading_list(
    State(state): State<Arc<AppState>>,
    Path(media_id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    if state.store().remove_from_reading_list(media_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("{} is not on the reading list", media_id)))
    }
}

pub async fn list_associations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Association>>, ApiError> {
    Ok(Json(state.store().list_associations()?))
}

pub async fn clear_associations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearResponse>, ApiError> {
    let removed = state.store().clear_associations()?;
    Ok(Json(ClearResponse { removed }))
}

pub async fn delete_association(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store().delete_association(&key)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("No association for {}", key)))
    }
}
