//! API handlers module
//!
//! Response shapes shared by several handler groups live here.

pub mod auth;
pub mod health;
pub mod ingredients;
pub mod recipes;
pub mod tags;
pub mod users;

use foodgram_common::{
    config::AppConfig,
    db::{models::Recipe, UserProfile},
    errors::{AppError, Result},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `page` (1-based) and `limit` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl Pagination {
    /// Zero-based page index and page size clamped to the configured bounds
    pub fn resolve(&self, config: &AppConfig) -> (u64, u64) {
        let page = self.page.unwrap_or(1).saturating_sub(1);
        (page, config.page_size(self.limit))
    }
}

/// Paginated list body
#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub count: u64,
    pub results: Vec<T>,
}

/// Public user representation
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub avatar: Option<String>,
}

impl From<UserProfile> for UserResponse {
    fn from(profile: UserProfile) -> Self {
        let user = profile.user;
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed: profile.is_subscribed,
            avatar: user.avatar,
        }
    }
}

/// Short recipe representation used in subscription lists and toggles
#[derive(Debug, Serialize)]
pub struct RecipeShortResponse {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl From<Recipe> for RecipeShortResponse {
    fn from(recipe: Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name,
            image: recipe.image,
            cooking_time: recipe.cooking_time,
        }
    }
}

/// Label a toggle result for the `foodgram_toggles_total` counter
pub(crate) fn toggle_outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(AppError::AlreadyExists { .. }) => "conflict",
        Err(AppError::MembershipNotFound { .. }) => "not_found",
        Err(AppError::SelfFollow) => "self_follow",
        Err(e) if e.is_client_error() => "rejected",
        Err(_) => "error",
    }
}
