//! Request handlers

pub mod auth;
pub mod chat;
pub mod chroma;
pub mod editais;
pub mod health;
pub mod jobs;

use crate::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};
use fomentos_common::auth::extract_bearer_token;
use fomentos_common::errors::AppError;
use serde::Deserialize;

/// The authenticated caller, extracted from the bearer token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub email: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let token = extract_bearer_token(header).ok_or_else(|| AppError::Unauthorized {
            message: "Expected a bearer token".to_string(),
        })?;

        let claims = state.jwt.validate_token(token)?;
        Ok(AuthUser { email: claims.sub })
    }
}

/// Shared pagination query parameters
#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}
