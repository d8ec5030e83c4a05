//! Editais read API (CRUD glue over the canonical store)

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use fomentos_common::db::models::{EditalDocument, EditalFields};
use fomentos_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};

use super::AuthUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListEditaisParams {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub origem: Option<String>,
}

fn default_limit() -> i64 {
    100
}

/// Summary view; the chunk history stays out of listings
#[derive(Serialize)]
pub struct EditalSummary {
    pub uuid: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origem: Option<String>,
    pub extraction_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consolidated_variables: Option<EditalFields>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EditalDocument> for EditalSummary {
    fn from(doc: EditalDocument) -> Self {
        Self {
            uuid: doc.uuid,
            link: doc.link,
            origem: doc.origem,
            extraction_status: doc.extraction_status.as_str().to_string(),
            consolidated_variables: doc.consolidated_variables,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct EditalListResponse {
    pub editais: Vec<EditalSummary>,
    pub total: usize,
}

pub async fn list_editais(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(params): Query<ListEditaisParams>,
) -> Result<Json<EditalListResponse>> {
    let editais = state
        .repo
        .list_editais(params.origem.as_deref(), params.skip, params.limit)
        .await?;

    let editais: Vec<EditalSummary> = editais.into_iter().map(EditalSummary::from).collect();
    Ok(Json(EditalListResponse {
        total: editais.len(),
        editais,
    }))
}

/// Full record including the per-chunk extraction history
pub async fn get_edital(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(uuid): Path<String>,
) -> Result<Json<EditalDocument>> {
    let edital = state
        .repo
        .find_edital_by_uuid(&uuid)
        .await?
        .ok_or_else(|| AppError::EditalNotFound { id: uuid })?;

    Ok(Json(edital))
}
