//! Minimal Chroma REST client
//!
//! Covers the collection operations the pipeline needs: lookup, create,
//! delete, add, query, get, delete-by-filter and count. Embeddings are
//! always supplied by the caller so the collection never mixes models.

use crate::errors::{AppError, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Handle to a collection on the server
#[derive(Clone, Debug, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl CollectionInfo {
    /// The embedding model recorded at creation time, if any
    pub fn embedding_model(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("embedding_model"))
            .and_then(|v| v.as_str())
    }
}

/// Raw query response (parallel arrays, one row per query embedding)
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub metadatas: Vec<Vec<Option<Map<String, Value>>>>,
    #[serde(default)]
    pub distances: Vec<Vec<f32>>,
}

/// Raw get response (flat parallel arrays)
#[derive(Debug, Default, Deserialize)]
pub struct GetResponse {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub documents: Vec<Option<String>>,
    #[serde(default)]
    pub metadatas: Vec<Option<Map<String, Value>>>,
}

pub struct ChromaClient {
    client: reqwest::Client,
    base_url: String,
}

impl ChromaClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    async fn check(&self, response: reqwest::Response, op: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::VectorStore {
            message: format!("{} failed with {}: {}", op, status, body),
        })
    }

    /// Look up a collection by name; Ok(None) when it does not exist
    pub async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let response = self
            .client
            .get(self.url(&format!("collections/{}", name)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let info = response
            .json::<CollectionInfo>()
            .await
            .map_err(|e| AppError::VectorStore {
                message: format!("unparseable collection info: {}", e),
            })?;
        Ok(Some(info))
    }

    /// Create a collection carrying the given metadata
    pub async fn create_collection(
        &self,
        name: &str,
        metadata: Map<String, Value>,
    ) -> Result<CollectionInfo> {
        let response = self
            .client
            .post(self.url("collections"))
            .json(&json!({
                "name": name,
                "metadata": metadata,
                "get_or_create": false,
            }))
            .send()
            .await?;

        let response = self.check(response, "create_collection").await?;
        response
            .json::<CollectionInfo>()
            .await
            .map_err(|e| AppError::VectorStore {
                message: format!("unparseable collection info: {}", e),
            })
    }

    /// Drop a collection and everything in it
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("collections/{}", name)))
            .send()
            .await?;
        self.check(response, "delete_collection").await?;
        Ok(())
    }

    /// Write one entry with a precomputed embedding. Upsert semantics:
    /// writing an existing id replaces it, which is what keeps
    /// deterministic chunk ids duplicate-free across reruns.
    pub async fn upsert(
        &self,
        collection_id: &str,
        id: &str,
        embedding: &[f32],
        metadata: &Map<String, Value>,
        document: &str,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("collections/{}/upsert", collection_id)))
            .json(&json!({
                "ids": [id],
                "embeddings": [embedding],
                "metadatas": [metadata],
                "documents": [document],
            }))
            .send()
            .await?;
        self.check(response, "upsert").await?;
        Ok(())
    }

    /// Nearest-neighbour query with an optional metadata equality filter
    pub async fn query(
        &self,
        collection_id: &str,
        embedding: &[f32],
        n_results: usize,
        where_filter: Option<&Value>,
    ) -> Result<QueryResponse> {
        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(filter) = where_filter {
            body["where"] = filter.clone();
        }

        let response = self
            .client
            .post(self.url(&format!("collections/{}/query", collection_id)))
            .json(&body)
            .send()
            .await?;

        let response = self.check(response, "query").await?;
        response
            .json::<QueryResponse>()
            .await
            .map_err(|e| AppError::VectorStore {
                message: format!("unparseable query response: {}", e),
            })
    }

    /// Fetch entries by filter (or everything when the filter is None)
    pub async fn get(
        &self,
        collection_id: &str,
        where_filter: Option<&Value>,
        limit: Option<usize>,
    ) -> Result<GetResponse> {
        let mut body = json!({
            "include": ["documents", "metadatas"],
        });
        if let Some(filter) = where_filter {
            body["where"] = filter.clone();
        }
        if let Some(limit) = limit {
            body["limit"] = json!(limit);
        }

        let response = self
            .client
            .post(self.url(&format!("collections/{}/get", collection_id)))
            .json(&body)
            .send()
            .await?;

        let response = self.check(response, "get").await?;
        response
            .json::<GetResponse>()
            .await
            .map_err(|e| AppError::VectorStore {
                message: format!("unparseable get response: {}", e),
            })
    }

    /// Delete entries by id
    pub async fn delete(&self, collection_id: &str, ids: &[String]) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("collections/{}/delete", collection_id)))
            .json(&json!({ "ids": ids }))
            .send()
            .await?;
        self.check(response, "delete").await?;
        Ok(())
    }

    /// Number of entries in the collection
    pub async fn count(&self, collection_id: &str) -> Result<u64> {
        let response = self
            .client
            .get(self.url(&format!("collections/{}/count", collection_id)))
            .send()
            .await?;

        let response = self.check(response, "count").await?;
        response.json::<u64>().await.map_err(|e| AppError::VectorStore {
            message: format!("unparseable count: {}", e),
        })
    }
}
