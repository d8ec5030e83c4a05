//! Vector index service
//!
//! One logical collection of edital chunks, keyed by
//! `{edital_uuid}_chunk_{index}`. The collection records the embedding model
//! it was built with; on startup a mismatch against the configured model
//! drops and recreates it, because mixing models inside one collection
//! silently corrupts similarity.

pub mod chroma;

use crate::config::ChromaConfig;
use crate::embeddings::Embedder;
use crate::errors::Result;
use chrono::Utc;
use chroma::{ChromaClient, CollectionInfo};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// One retrieved chunk
#[derive(Clone, Debug, Serialize)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    /// Smaller = more similar; near-perfect matches may be negative
    pub distance: f32,
}

/// Collection statistics for the inspection API
#[derive(Clone, Debug, Serialize)]
pub struct VectorStats {
    pub total_chunks: u64,
    pub total_editais: usize,
    pub collection_name: String,
    pub unique_editais_ids: Vec<String>,
    pub embedding_info: EmbeddingInfo,
}

#[derive(Clone, Debug, Serialize)]
pub struct EmbeddingInfo {
    pub model: String,
    pub provider: String,
}

pub struct VectorService {
    chroma: ChromaClient,
    embedder: Arc<dyn Embedder>,
    collection_name: String,
    collection: RwLock<CollectionInfo>,
}

impl VectorService {
    /// Connect, enforce the embedding-model invariant, and return the
    /// ready-to-use service.
    pub async fn initialize(
        config: &ChromaConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let chroma = ChromaClient::new(&config.base_url())?;
        let collection =
            Self::ensure_collection(&chroma, &config.collection, embedder.model_name()).await?;

        Ok(Self {
            chroma,
            embedder,
            collection_name: config.collection.clone(),
            collection: RwLock::new(collection),
        })
    }

    /// Reuse the collection when its recorded model matches the configured
    /// one; otherwise drop and recreate it.
    async fn ensure_collection(
        chroma: &ChromaClient,
        name: &str,
        model: &str,
    ) -> Result<CollectionInfo> {
        if let Some(existing) = chroma.get_collection(name).await? {
            if existing.embedding_model() == Some(model) {
                info!(collection = name, model, "Reusing vector collection");
                return Ok(existing);
            }

            warn!(
                collection = name,
                recorded = ?existing.embedding_model(),
                configured = model,
                "Embedding model mismatch, recreating collection"
            );
            chroma.delete_collection(name).await?;
        }

        let metadata = collection_metadata(model);
        let created = chroma.create_collection(name, metadata).await?;
        info!(collection = name, model, "Created vector collection");
        Ok(created)
    }

    /// One dummy query so the first user-facing search has no cold start
    pub async fn warmup(&self) {
        match self.search("test", 1, None).await {
            Ok(_) => info!("Vector collection warmed up"),
            Err(e) => warn!(error = %e, "Vector warmup failed (non-critical)"),
        }
    }

    /// Deterministic id for a chunk of an edital
    pub fn chunk_id(edital_uuid: &str, chunk_index: u32) -> String {
        format!("{}_chunk_{}", edital_uuid, chunk_index)
    }

    /// Write one chunk. The entry id is deterministic, so reprocessing the
    /// same content replaces chunks instead of duplicating them.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_chunk(
        &self,
        chunk_text: &str,
        edital_uuid: &str,
        edital_name: &str,
        chunk_index: u32,
        total_chunks: u32,
        extra_metadata: Map<String, Value>,
    ) -> Result<String> {
        let chunk_id = Self::chunk_id(edital_uuid, chunk_index);

        let mut metadata = Map::new();
        metadata.insert("edital_uuid".into(), json!(edital_uuid));
        let name = if edital_name.trim().is_empty() {
            "Sem nome"
        } else {
            edital_name
        };
        metadata.insert("edital_name".into(), json!(name));
        metadata.insert("chunk_index".into(), json!(chunk_index));
        metadata.insert("total_chunks".into(), json!(total_chunks));
        metadata.insert("created_at".into(), json!(Utc::now().to_rfc3339()));

        for (key, value) in extra_metadata {
            if let Some(primitive) = to_primitive(value) {
                metadata.insert(key, primitive);
            }
        }

        let embedding = self.embedder.embed(chunk_text).await?;

        let collection = self.collection.read().await;
        self.chroma
            .upsert(&collection.id, &chunk_id, &embedding, &metadata, chunk_text)
            .await?;

        metrics::counter!("fomentos_chunks_indexed_total").increment(1);
        Ok(chunk_id)
    }

    /// Nearest-neighbour search with an optional `edital_uuid` filter
    pub async fn search(
        &self,
        query: &str,
        n_results: usize,
        edital_uuid: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        let embedding = self.embedder.embed(query).await?;
        let where_filter = edital_uuid.map(|uuid| json!({ "edital_uuid": uuid }));

        let collection = self.collection.read().await;
        let response = self
            .chroma
            .query(
                &collection.id,
                &embedding,
                n_results,
                where_filter.as_ref(),
            )
            .await?;
        drop(collection);

        let mut results = Vec::new();
        if let (Some(ids), Some(documents), Some(metadatas), Some(distances)) = (
            response.ids.into_iter().next(),
            response.documents.into_iter().next(),
            response.metadatas.into_iter().next(),
            response.distances.into_iter().next(),
        ) {
            for (((id, document), metadata), distance) in ids
                .into_iter()
                .zip(documents)
                .zip(metadatas)
                .zip(distances)
            {
                results.push(ScoredChunk {
                    id,
                    text: document.unwrap_or_default(),
                    metadata: metadata.unwrap_or_default(),
                    distance,
                });
            }
        }

        metrics::counter!("fomentos_vector_searches_total").increment(1);
        Ok(results)
    }

    /// Everything in the collection (inspection endpoint)
    pub async fn all_documents(&self) -> Result<chroma::GetResponse> {
        let collection = self.collection.read().await;
        self.chroma.get(&collection.id, None, None).await
    }

    /// Delete all chunks belonging to one edital; returns how many
    pub async fn delete_by_edital(&self, edital_uuid: &str) -> Result<usize> {
        let filter = json!({ "edital_uuid": edital_uuid });
        let collection = self.collection.read().await;
        let existing = self
            .chroma
            .get(&collection.id, Some(&filter), None)
            .await?;

        if existing.ids.is_empty() {
            return Ok(0);
        }

        let count = existing.ids.len();
        self.chroma.delete(&collection.id, &existing.ids).await?;
        info!(edital_uuid, count, "Deleted edital chunks from vector index");
        Ok(count)
    }

    /// Drop and recreate the collection, leaving it empty
    pub async fn clear(&self) -> Result<()> {
        let mut collection = self.collection.write().await;
        self.chroma.delete_collection(&self.collection_name).await?;
        let metadata = collection_metadata(self.embedder.model_name());
        *collection = self
            .chroma
            .create_collection(&self.collection_name, metadata)
            .await?;
        info!(collection = %self.collection_name, "Vector collection cleared");
        Ok(())
    }

    /// Collection statistics, including the active embedding model
    pub async fn stats(&self) -> Result<VectorStats> {
        let collection = self.collection.read().await;
        let total_chunks = self.chroma.count(&collection.id).await?;
        let all = self.chroma.get(&collection.id, None, None).await?;

        let mut unique: HashSet<String> = HashSet::new();
        for metadata in all.metadatas.into_iter().flatten() {
            if let Some(uuid) = metadata.get("edital_uuid").and_then(|v| v.as_str()) {
                unique.insert(uuid.to_string());
            }
        }

        let model = collection
            .embedding_model()
            .unwrap_or("UNKNOWN")
            .to_string();
        let provider = collection
            .metadata
            .as_ref()
            .and_then(|m| m.get("embedding_provider"))
            .and_then(|v| v.as_str())
            .unwrap_or("UNKNOWN")
            .to_string();

        let mut unique_editais_ids: Vec<String> = unique.into_iter().collect();
        unique_editais_ids.sort();

        Ok(VectorStats {
            total_chunks,
            total_editais: unique_editais_ids.len(),
            collection_name: self.collection_name.clone(),
            unique_editais_ids,
            embedding_info: EmbeddingInfo { model, provider },
        })
    }

    /// The model the active collection is fingerprinted with
    pub async fn embedding_model(&self) -> String {
        self.collection
            .read()
            .await
            .embedding_model()
            .unwrap_or("UNKNOWN")
            .to_string()
    }
}

fn collection_metadata(model: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("description".into(), json!("Chunks de editais vetorizados"));
    metadata.insert("embedding_model".into(), json!(model));
    metadata.insert("embedding_provider".into(), json!("OpenAI"));
    metadata.insert("language".into(), json!("pt-BR"));
    metadata
}

/// Metadata values are restricted to primitives; anything else is
/// serialized to a JSON string. Nulls are dropped.
fn to_primitive(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Some(value),
        other => Some(Value::String(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_deterministic() {
        let id = VectorService::chunk_id("9f3b2c1a", 7);
        assert_eq!(id, "9f3b2c1a_chunk_7");
        assert_eq!(id, VectorService::chunk_id("9f3b2c1a", 7));
    }

    #[test]
    fn test_to_primitive_passes_scalars() {
        assert_eq!(to_primitive(json!("CNPq")), Some(json!("CNPq")));
        assert_eq!(to_primitive(json!(42)), Some(json!(42)));
        assert_eq!(to_primitive(json!(true)), Some(json!(true)));
    }

    #[test]
    fn test_to_primitive_serializes_structures() {
        let value = to_primitive(json!({ "a": 1 })).unwrap();
        assert_eq!(value, json!("{\"a\":1}"));

        let value = to_primitive(json!([1, 2])).unwrap();
        assert_eq!(value, json!("[1,2]"));
    }

    #[test]
    fn test_to_primitive_drops_nulls() {
        assert_eq!(to_primitive(Value::Null), None);
    }

    #[test]
    fn test_collection_metadata_records_model() {
        let metadata = collection_metadata("text-embedding-3-small");
        assert_eq!(
            metadata.get("embedding_model"),
            Some(&json!("text-embedding-3-small"))
        );
        assert_eq!(metadata.get("embedding_provider"), Some(&json!("OpenAI")));
    }
}
