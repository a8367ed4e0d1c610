//! User, avatar, password and subscription handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{toggle_outcome, PageResponse, Pagination, RecipeShortResponse, UserResponse};
use crate::{extract::ValidatedJson, AppState};
use foodgram_common::{
    auth::{hash_password, verify_password, AuthUser, MaybeAuthUser},
    db::{NewUser, Repository, UserProfile},
    errors::{AppError, Result},
    metrics,
};

/// Registration payload
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email, length(max = 254))]
    pub email: String,

    #[validate(length(min = 1, max = 150), custom(function = "validate_username"))]
    pub username: String,

    #[validate(length(min = 1, max = 150))]
    pub first_name: String,

    #[validate(length(min = 1, max = 150))]
    pub last_name: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Registered user, without subscription state
#[derive(Debug, Serialize)]
pub struct RegisteredUserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AvatarRequest {
    /// URL or base64 data URI
    #[validate(length(min = 1))]
    pub avatar: String,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetPasswordRequest {
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,

    #[validate(length(min = 1))]
    pub current_password: String,
}

/// `recipes_limit` for the embedded recipe lists
#[derive(Debug, Default, Deserialize)]
pub struct RecipesLimit {
    pub recipes_limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub recipes_limit: Option<u64>,
}

/// Followed author with their newest recipes
#[derive(Debug, Serialize)]
pub struct UserWithRecipesResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub recipes: Vec<RecipeShortResponse>,
    pub recipes_count: u64,
}

/// Letters, digits and `.@+-_`; "me" is taken by the `/users/me` route
fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    if username.eq_ignore_ascii_case("me") {
        return Err(ValidationError::new("reserved_username")
            .with_message("This username is reserved".into()));
    }

    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '.' | '@' | '+' | '-' | '_');
    if !username.chars().all(allowed) {
        return Err(ValidationError::new("invalid_username")
            .with_message("Username may contain only letters, digits and .@+-_".into()));
    }

    Ok(())
}

async fn with_recipes(
    repo: &Repository,
    author: UserProfile,
    recipes_limit: Option<u64>,
) -> Result<UserWithRecipesResponse> {
    let author_id = author.user.id;
    let recipes = repo.recipes_by_author(author_id, recipes_limit).await?;
    let recipes_count = repo.count_recipes_by_author(author_id).await?;

    Ok(UserWithRecipesResponse {
        user: author.into(),
        recipes: recipes.into_iter().map(Into::into).collect(),
        recipes_count,
    })
}

/// Register a new user
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredUserResponse>)> {
    let password_hash = hash_password(&request.password)?;

    let user = state
        .repo()
        .create_user(NewUser {
            email: request.email,
            username: request.username,
            first_name: request.first_name,
            last_name: request.last_name,
            password_hash,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisteredUserResponse {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }),
    ))
}

/// List users
pub async fn list_users(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<PageResponse<UserResponse>>> {
    let repo = state.repo();
    let (page, limit) = pagination.resolve(&state.config);

    let users = repo.list_users(page, limit).await?;
    let profiles = repo.user_profiles(users.items, viewer.user_id()).await?;

    Ok(Json(PageResponse {
        count: users.total,
        results: profiles.into_iter().map(Into::into).collect(),
    }))
}

/// Get a user profile by ID
pub async fn get_user(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>> {
    let repo = state.repo();
    let user = repo.require_user(user_id).await?;
    let profile = repo.user_profile(user, viewer.user_id()).await?;

    Ok(Json(profile.into()))
}

/// The calling user
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<UserResponse>> {
    let user = state.repo().require_user(auth.user_id).await?;

    Ok(Json(
        UserProfile {
            user,
            is_subscribed: false,
        }
        .into(),
    ))
}

/// Set the caller's avatar
pub async fn set_avatar(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(request): ValidatedJson<AvatarRequest>,
) -> Result<Json<AvatarResponse>> {
    let user = state
        .repo()
        .set_avatar(auth.user_id, Some(request.avatar))
        .await?;

    Ok(Json(AvatarResponse {
        avatar: user.avatar,
    }))
}

/// Remove the caller's avatar
pub async fn delete_avatar(State(state): State<AppState>, auth: AuthUser) -> Result<StatusCode> {
    state.repo().set_avatar(auth.user_id, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Change the caller's password
pub async fn set_password(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(request): ValidatedJson<SetPasswordRequest>,
) -> Result<StatusCode> {
    let repo = state.repo();
    let user = repo.require_user(auth.user_id).await?;

    if !verify_password(&request.current_password, &user.password_hash) {
        return Err(AppError::validation(
            "current_password",
            "Current password is incorrect",
        ));
    }

    let password_hash = hash_password(&request.new_password)?;
    repo.set_password_hash(user.id, password_hash).await?;

    tracing::info!(user_id = %user.id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

/// Authors the caller follows, each with their newest recipes
pub async fn subscriptions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<SubscriptionsQuery>,
) -> Result<Json<PageResponse<UserWithRecipesResponse>>> {
    let repo = state.repo();
    let pagination = Pagination {
        page: query.page,
        limit: query.limit,
    };
    let (page, limit) = pagination.resolve(&state.config);

    let authors = repo.list_subscriptions(auth.user_id, page, limit).await?;

    let mut results = Vec::with_capacity(authors.items.len());
    for user in authors.items {
        let profile = UserProfile {
            user,
            is_subscribed: true,
        };
        results.push(with_recipes(&repo, profile, query.recipes_limit).await?);
    }

    Ok(Json(PageResponse {
        count: authors.total,
        results,
    }))
}

/// Follow an author
pub async fn subscribe(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(author_id): Path<Uuid>,
    Query(query): Query<RecipesLimit>,
) -> Result<(StatusCode, Json<UserWithRecipesResponse>)> {
    let repo = state.repo();

    let result = repo.subscribe(auth.user_id, author_id).await;
    metrics::record_toggle("subscription", "add", toggle_outcome(&result));
    let author = result?;

    let profile = UserProfile {
        user: author,
        is_subscribed: true,
    };
    let body = with_recipes(&repo, profile, query.recipes_limit).await?;

    Ok((StatusCode::CREATED, Json(body)))
}

/// Unfollow an author
pub async fn unsubscribe(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(author_id): Path<Uuid>,
) -> Result<StatusCode> {
    let result = state.repo().unsubscribe(auth.user_id, author_id).await;
    metrics::record_toggle("subscription", "remove", toggle_outcome(&result));
    result?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("chef.anna+1@home").is_ok());
        assert!(validate_username("me").is_err());
        assert!(validate_username("ME").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("semi;colon").is_err());
    }

    #[test]
    fn test_register_request_validation() {
        let request = RegisterRequest {
            email: "not-an-email".into(),
            username: "anna".into(),
            first_name: "Anna".into(),
            last_name: "Cook".into(),
            password: "long-enough".into(),
        };
        assert!(request.validate().is_err());

        let request = RegisterRequest {
            email: "anna@example.com".into(),
            ..request
        };
        assert!(request.validate().is_ok());
    }
}
