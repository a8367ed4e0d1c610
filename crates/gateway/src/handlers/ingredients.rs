//! Ingredient handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use foodgram_common::{
    db::models::Ingredient,
    errors::{AppError, Result},
};

#[derive(Debug, Default, Deserialize)]
pub struct IngredientQuery {
    /// Case-insensitive name prefix
    pub name: Option<String>,
}

/// List ingredients, optionally narrowed by name prefix
pub async fn list_ingredients(
    State(state): State<AppState>,
    Query(query): Query<IngredientQuery>,
) -> Result<Json<Vec<Ingredient>>> {
    let ingredients = state
        .repo()
        .search_ingredients(query.name.as_deref())
        .await?;

    Ok(Json(ingredients))
}

/// Get an ingredient by ID
pub async fn get_ingredient(
    State(state): State<AppState>,
    Path(ingredient_id): Path<Uuid>,
) -> Result<Json<Ingredient>> {
    state
        .repo()
        .find_ingredient(ingredient_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound {
            resource_type: "Ingredient".to_string(),
            id: ingredient_id.to_string(),
        })
}
