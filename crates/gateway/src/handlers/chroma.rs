//! Vector-store inspection handlers

use axum::{
    extract::{Path, State},
    Json,
};
use fomentos_common::errors::Result;
use fomentos_common::vector::{ScoredChunk, VectorStats};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::AuthUser;
use crate::AppState;

#[derive(Serialize)]
pub struct DocumentsResponse {
    pub ids: Vec<String>,
    pub documents: Vec<Option<String>>,
    pub metadatas: Vec<Option<Map<String, Value>>>,
    pub total: usize,
}

/// Everything currently indexed
pub async fn all_documents(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<DocumentsResponse>> {
    let all = state.vector.all_documents().await?;
    Ok(Json(DocumentsResponse {
        total: all.ids.len(),
        ids: all.ids,
        documents: all.documents,
        metadatas: all.metadatas,
    }))
}

/// Collection statistics, including the active embedding model
pub async fn stats(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<VectorStats>> {
    Ok(Json(state.vector.stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(default)]
    pub edital_uuid: Option<String>,
}

fn default_n_results() -> usize {
    10
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredChunk>,
    pub total: usize,
}

/// Raw similarity search for debugging retrieval quality
pub async fn search(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let results = state
        .vector
        .search(
            &request.query,
            request.n_results,
            request.edital_uuid.as_deref(),
        )
        .await?;

    Ok(Json(SearchResponse {
        total: results.len(),
        results,
    }))
}

#[derive(Serialize)]
pub struct DeleteChunksResponse {
    pub deleted_chunks: usize,
}

/// Drop one edital's chunks from the index
pub async fn delete_edital_chunks(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(uuid): Path<String>,
) -> Result<Json<DeleteChunksResponse>> {
    let deleted_chunks = state.vector.delete_by_edital(&uuid).await?;
    Ok(Json(DeleteChunksResponse { deleted_chunks }))
}
