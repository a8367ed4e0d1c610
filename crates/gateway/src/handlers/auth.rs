//! Token login and logout

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{extract::ValidatedJson, AppState};
use foodgram_common::{
    auth::{verify_password, AuthUser},
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,

    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub auth_token: String,
}

/// Exchange email and password for a JWT
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    let user = state
        .repo()
        .find_user_by_email(&request.email)
        .await?
        .filter(|user| verify_password(&request.password, &user.password_hash))
        .ok_or(AppError::InvalidCredentials)?;

    let auth_token = state.jwt.generate_token(user.id)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(TokenResponse { auth_token }))
}

/// Tokens are stateless; logout only confirms the caller was authenticated
pub async fn logout(auth: AuthUser) -> StatusCode {
    tracing::debug!(user_id = %auth.user_id, "User logged out");
    StatusCode::NO_CONTENT
}
