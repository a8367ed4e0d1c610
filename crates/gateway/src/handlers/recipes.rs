//! Recipe handlers: CRUD, favorites, shopping cart and the shopping list download

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{toggle_outcome, PageResponse, Pagination, RecipeShortResponse, UserResponse};
use crate::{extract::ValidatedJson, AppState};
use foodgram_common::{
    auth::{AuthUser, MaybeAuthUser},
    db::{models::Tag, NewRecipe, RecipeDetails, RecipeFilter, RecipePatch},
    errors::{AppError, Result},
    metrics, shopping_list,
};

/// Ingredient reference with the amount used
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientAmount {
    pub id: Uuid,
    pub amount: Decimal,
}

/// Recipe creation payload
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRecipeRequest {
    #[validate(length(min = 1))]
    pub ingredients: Vec<IngredientAmount>,

    #[validate(length(min = 1))]
    pub tags: Vec<Uuid>,

    /// URL or base64 data URI
    #[validate(length(min = 1))]
    pub image: String,

    #[validate(length(min = 1, max = 256))]
    pub name: String,

    #[validate(length(min = 1))]
    pub text: String,

    #[validate(range(min = 1))]
    pub cooking_time: i32,
}

/// Partial recipe update
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRecipeRequest {
    #[validate(length(min = 1))]
    pub ingredients: Option<Vec<IngredientAmount>>,

    #[validate(length(min = 1))]
    pub tags: Option<Vec<Uuid>>,

    #[validate(length(min = 1))]
    pub image: Option<String>,

    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,

    #[validate(length(min = 1))]
    pub text: Option<String>,

    #[validate(range(min = 1))]
    pub cooking_time: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct RecipeIngredientResponse {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Full recipe representation
#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub id: Uuid,
    pub tags: Vec<Tag>,
    pub author: UserResponse,
    pub ingredients: Vec<RecipeIngredientResponse>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

impl From<RecipeDetails> for RecipeResponse {
    fn from(details: RecipeDetails) -> Self {
        let recipe = details.recipe;
        Self {
            id: recipe.id,
            tags: details.tags,
            author: details.author.into(),
            ingredients: details
                .ingredients
                .into_iter()
                .map(|item| RecipeIngredientResponse {
                    id: item.ingredient.id,
                    name: item.ingredient.name,
                    measurement_unit: item.ingredient.measurement_unit,
                    amount: item.amount,
                })
                .collect(),
            is_favorited: details.is_favorited,
            is_in_shopping_cart: details.is_in_shopping_cart,
            name: recipe.name,
            image: recipe.image,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        }
    }
}

/// Recipe list query. `tags` may repeat, so the raw pairs are parsed by hand.
#[derive(Debug, Default, PartialEq)]
pub struct RecipeQuery {
    pub tags: Vec<String>,
    pub author: Option<Uuid>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl RecipeQuery {
    pub fn parse(pairs: Vec<(String, String)>) -> Result<Self> {
        let mut query = Self::default();

        for (key, value) in pairs {
            match key.as_str() {
                "tags" => query.tags.push(value),
                "author" => {
                    let author = Uuid::parse_str(&value)
                        .map_err(|_| AppError::validation("author", "Author must be a user id"))?;
                    query.author = Some(author);
                }
                "is_favorited" => query.is_favorited = parse_flag("is_favorited", &value)?,
                "is_in_shopping_cart" => {
                    query.is_in_shopping_cart = parse_flag("is_in_shopping_cart", &value)?
                }
                "page" => query.page = Some(parse_number("page", &value)?),
                "limit" => query.limit = Some(parse_number("limit", &value)?),
                _ => {}
            }
        }

        Ok(query)
    }

    /// Membership filters only apply to an authenticated caller
    fn filter(&self, viewer: Option<Uuid>) -> RecipeFilter {
        RecipeFilter {
            tags: self.tags.clone(),
            author: self.author,
            favorited_by: viewer.filter(|_| self.is_favorited),
            in_cart_of: viewer.filter(|_| self.is_in_shopping_cart),
        }
    }
}

fn parse_flag(field: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(AppError::validation(field, "Expected 0 or 1")),
    }
}

fn parse_number(field: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| AppError::validation(field, "Expected a positive integer"))
}

fn ingredient_pairs(items: Vec<IngredientAmount>) -> Vec<(Uuid, Decimal)> {
    items.into_iter().map(|item| (item.id, item.amount)).collect()
}

/// List recipes, newest first
pub async fn list_recipes(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<PageResponse<RecipeResponse>>> {
    let query = RecipeQuery::parse(pairs)?;
    let pagination = Pagination {
        page: query.page,
        limit: query.limit,
    };
    let (page, limit) = pagination.resolve(&state.config);

    let repo = state.repo();
    let recipes = repo
        .list_recipes(&query.filter(viewer.user_id()), page, limit)
        .await?;
    let details = repo.recipe_details(recipes.items, viewer.user_id()).await?;

    Ok(Json(PageResponse {
        count: recipes.total,
        results: details.into_iter().map(Into::into).collect(),
    }))
}

/// Create a recipe authored by the caller
pub async fn create_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<RecipeResponse>)> {
    let repo = state.repo();

    let recipe = repo
        .create_recipe(
            auth.user_id,
            NewRecipe {
                name: request.name,
                image: request.image,
                text: request.text,
                cooking_time: request.cooking_time,
                ingredients: ingredient_pairs(request.ingredients),
                tags: request.tags,
            },
        )
        .await?;
    metrics::record_recipe_write("create");

    let details = repo.recipe_detail(recipe.id, Some(auth.user_id)).await?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

/// Get a recipe by ID
pub async fn get_recipe(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(recipe_id): Path<Uuid>,
) -> Result<Json<RecipeResponse>> {
    let details = state
        .repo()
        .recipe_detail(recipe_id, viewer.user_id())
        .await?;

    Ok(Json(details.into()))
}

/// Update a recipe; only its author may do so
pub async fn update_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(recipe_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateRecipeRequest>,
) -> Result<Json<RecipeResponse>> {
    let repo = state.repo();

    let patch = RecipePatch {
        name: request.name,
        image: request.image,
        text: request.text,
        cooking_time: request.cooking_time,
        ingredients: request.ingredients.map(ingredient_pairs),
        tags: request.tags,
    };
    repo.update_recipe(recipe_id, auth.user_id, patch).await?;
    metrics::record_recipe_write("update");

    let details = repo.recipe_detail(recipe_id, Some(auth.user_id)).await?;
    Ok(Json(details.into()))
}

/// Delete a recipe; only its author may do so
pub async fn delete_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(recipe_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.repo().delete_recipe(recipe_id, auth.user_id).await?;
    metrics::record_recipe_write("delete");

    Ok(StatusCode::NO_CONTENT)
}

/// Add a recipe to the caller's favorites
pub async fn add_favorite(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(recipe_id): Path<Uuid>,
) -> Result<(StatusCode, Json<RecipeShortResponse>)> {
    let result = state.repo().add_favorite(auth.user_id, recipe_id).await;
    metrics::record_toggle("favorite", "add", toggle_outcome(&result));

    Ok((StatusCode::CREATED, Json(result?.into())))
}

/// Remove a recipe from the caller's favorites
pub async fn remove_favorite(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(recipe_id): Path<Uuid>,
) -> Result<StatusCode> {
    let result = state.repo().remove_favorite(auth.user_id, recipe_id).await;
    metrics::record_toggle("favorite", "remove", toggle_outcome(&result));
    result?;

    Ok(StatusCode::NO_CONTENT)
}

/// Add a recipe to the caller's shopping cart
pub async fn add_to_cart(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(recipe_id): Path<Uuid>,
) -> Result<(StatusCode, Json<RecipeShortResponse>)> {
    let result = state.repo().add_to_cart(auth.user_id, recipe_id).await;
    metrics::record_toggle("shopping_cart", "add", toggle_outcome(&result));

    Ok((StatusCode::CREATED, Json(result?.into())))
}

/// Remove a recipe from the caller's shopping cart
pub async fn remove_from_cart(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(recipe_id): Path<Uuid>,
) -> Result<StatusCode> {
    let result = state.repo().remove_from_cart(auth.user_id, recipe_id).await;
    metrics::record_toggle("shopping_cart", "remove", toggle_outcome(&result));
    result?;

    Ok(StatusCode::NO_CONTENT)
}

/// Download the aggregated shopping list as a text attachment
pub async fn download_shopping_cart(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response> {
    let repo = state.repo();

    let list = match shopping_list::generate(&repo, auth.user_id).await {
        Ok(list) => list,
        Err(AppError::EmptyShoppingCart) => {
            metrics::record_shopping_list(None);
            return Err(AppError::EmptyShoppingCart);
        }
        Err(e) => return Err(e),
    };
    metrics::record_shopping_list(Some(list.ingredients.len()));

    let body = list.render(Utc::now().date_naive());
    let headers = [
        (header::CONTENT_TYPE, shopping_list::CONTENT_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", shopping_list::FILENAME),
        ),
    ];

    Ok((headers, body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_repeated_tags() {
        let query = RecipeQuery::parse(pairs(&[
            ("tags", "breakfast"),
            ("tags", "dinner"),
            ("is_favorited", "1"),
            ("page", "2"),
            ("unknown", "x"),
        ]))
        .unwrap();

        assert_eq!(query.tags, vec!["breakfast", "dinner"]);
        assert!(query.is_favorited);
        assert!(!query.is_in_shopping_cart);
        assert_eq!(query.page, Some(2));
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        let err = RecipeQuery::parse(pairs(&[("is_in_shopping_cart", "maybe")])).unwrap_err();
        assert_eq!(err.field(), Some("is_in_shopping_cart"));

        let err = RecipeQuery::parse(pairs(&[("author", "42")])).unwrap_err();
        assert_eq!(err.field(), Some("author"));

        assert!(RecipeQuery::parse(pairs(&[("limit", "-1")])).is_err());
    }

    #[test]
    fn test_membership_filters_need_viewer() {
        let query = RecipeQuery::parse(pairs(&[("is_favorited", "1"), ("is_in_shopping_cart", "1")]))
            .unwrap();

        let anonymous = query.filter(None);
        assert!(anonymous.favorited_by.is_none());
        assert!(anonymous.in_cart_of.is_none());

        let viewer = Uuid::new_v4();
        let filter = query.filter(Some(viewer));
        assert_eq!(filter.favorited_by, Some(viewer));
        assert_eq!(filter.in_cart_of, Some(viewer));
    }

    #[test]
    fn test_create_request_validation() {
        let request = CreateRecipeRequest {
            ingredients: Vec::new(),
            tags: vec![Uuid::new_v4()],
            image: "img".into(),
            name: "Soup".into(),
            text: "Boil".into(),
            cooking_time: 0,
        };

        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("ingredients"));
        assert!(fields.contains_key("cooking_time"));
    }

    #[test]
    fn test_ingredient_list_validation() {
        let ingredients = vec![IngredientAmount {
            id: Uuid::new_v4(),
            amount: Decimal::new(250, 0),
        }];
        let request = CreateRecipeRequest {
            ingredients: ingredients.clone(),
            tags: vec![Uuid::new_v4()],
            image: "img".into(),
            name: "Soup".into(),
            text: "Boil".into(),
            cooking_time: 10,
        };
        assert!(request.validate().is_ok());

        let update = UpdateRecipeRequest {
            ingredients: Some(Vec::new()),
            tags: None,
            image: None,
            name: None,
            text: None,
            cooking_time: None,
        };
        let errors = update.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("ingredients"));

        let update = UpdateRecipeRequest {
            ingredients: Some(ingredients),
            ..update
        };
        assert!(update.validate().is_ok());
    }
}
