//! Token issuance

use axum::{extract::State, Json};
use fomentos_common::auth::verify_password;
use fomentos_common::db::models::UserPublic;
use fomentos_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: UserPublic,
}

/// Exchange credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let user = state
        .repo
        .find_user_by_email(&request.email)
        .await?
        .filter(|user| verify_password(&request.password, &user.password_hash))
        .ok_or_else(|| AppError::Unauthorized {
            message: "Invalid credentials".to_string(),
        })?;

    let access_token = state.jwt.generate_token(&user.email)?;
    tracing::info!(email = %user.email, "Login");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer",
        user: UserPublic::from(&user),
    }))
}
