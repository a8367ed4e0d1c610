//! Tag handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::AppState;
use foodgram_common::{
    db::models::Tag,
    errors::{AppError, Result},
};

/// All tags ordered by name
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>> {
    Ok(Json(state.repo().list_tags().await?))
}

/// Get a tag by ID
pub async fn get_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<Uuid>,
) -> Result<Json<Tag>> {
    state
        .repo()
        .find_tag(tag_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound {
            resource_type: "Tag".to_string(),
            id: tag_id.to_string(),
        })
}
