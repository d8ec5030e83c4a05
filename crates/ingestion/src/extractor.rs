//! Progressive chunked LLM extraction
//!
//! The page-joined text is cut into overlapping chunks; each chunk produces
//! one strict-JSON LLM extraction that is immediately persisted (canonical
//! store append + vector index write) before being merged into the
//! accumulator. A chunk that cannot be parsed after retries is recorded as
//! a placeholder and never aborts the edital.

use crate::chunker::{chunk_text, ChunkingConfig};
use chrono::Utc;
use fomentos_common::db::models::{EditalFields, ExtractionChunk, ExtractionStatus, FailedChunk};
use fomentos_common::db::Repository;
use fomentos_common::errors::Result;
use fomentos_common::llm::{strip_code_fences, ChatCompletions, LlmMessage};
use fomentos_common::metrics::record_chunk_extracted;
use fomentos_common::vector::VectorService;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-chunk retries on parse failure or transport error
const MAX_CHUNK_RETRIES: u32 = 1;

/// How much of an unparseable reply is kept in the placeholder
const RAW_PLACEHOLDER_CHARS: usize = 500;

pub struct VariableExtractor {
    chat: Arc<ChatCompletions>,
    repo: Repository,
    vector: Arc<VectorService>,
    chunking: ChunkingConfig,
    chunk_delay: Duration,
}

impl VariableExtractor {
    pub fn new(
        chat: Arc<ChatCompletions>,
        repo: Repository,
        vector: Arc<VectorService>,
        chunking: ChunkingConfig,
        chunk_delay: Duration,
    ) -> Self {
        Self {
            chat,
            repo,
            vector,
            chunking,
            chunk_delay,
        }
    }

    /// Extract the 24-field schema chunk by chunk, persisting progressively.
    /// Returns the consolidated fields after the final commit.
    pub async fn extract_progressive(
        &self,
        text: &str,
        edital_uuid: &str,
        pdf_url: &str,
        origem: &str,
    ) -> Result<EditalFields> {
        let chunks = chunk_text(text, &self.chunking);
        let total_chunks = chunks.len() as u32;

        let mut accumulated = EditalFields {
            link: Some(pdf_url.to_string()),
            uuid: Some(edital_uuid.to_string()),
            ..Default::default()
        };

        info!(edital_uuid, total_chunks, "Starting progressive extraction");

        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_index = (i + 1) as u32;

            match self
                .extract_chunk_with_retry(chunk, chunk_index, total_chunks, origem)
                .await
            {
                Ok(chunk_vars) => {
                    record_chunk_extracted(true);

                    let record = ExtractionChunk {
                        chunk_index,
                        extracted_at: Utc::now(),
                        variables: chunk_vars.clone(),
                    };
                    self.repo
                        .save_partial_extraction(edital_uuid, pdf_url, &record)
                        .await?;
                    debug!(edital_uuid, chunk_index, "Chunk extraction persisted");

                    self.index_chunk(
                        chunk,
                        edital_uuid,
                        chunk_index,
                        total_chunks,
                        pdf_url,
                        origem,
                        &chunk_vars,
                        &accumulated,
                    )
                    .await;

                    accumulated = accumulated.merge(&chunk_vars);
                }
                Err(raw) => {
                    record_chunk_extracted(false);
                    warn!(
                        edital_uuid,
                        chunk_index, "Chunk skipped after retries, recording placeholder"
                    );

                    let failed = FailedChunk {
                        chunk_index,
                        erro: "resposta_invalida".to_string(),
                        raw: raw.chars().take(RAW_PLACEHOLDER_CHARS).collect(),
                        timestamp: Utc::now(),
                    };
                    self.repo
                        .save_failed_chunk(edital_uuid, pdf_url, &failed)
                        .await?;

                    // The raw text is still retrievable even when the
                    // extraction was not
                    self.index_chunk(
                        chunk,
                        edital_uuid,
                        chunk_index,
                        total_chunks,
                        pdf_url,
                        origem,
                        &EditalFields::default(),
                        &accumulated,
                    )
                    .await;
                }
            }

            // Cooperative backpressure against the LLM API
            tokio::time::sleep(self.chunk_delay).await;
        }

        // Finalization: system state owns link and uuid
        accumulated.link = Some(pdf_url.to_string());
        accumulated.uuid = Some(edital_uuid.to_string());

        self.repo
            .save_final_extraction(edital_uuid, &accumulated, ExtractionStatus::Completed)
            .await?;
        info!(edital_uuid, "Consolidated extraction committed");

        Ok(accumulated)
    }

    /// One chunk through the LLM, retried once. Err carries the raw reply
    /// (or error text) for the placeholder.
    async fn extract_chunk_with_retry(
        &self,
        chunk: &str,
        chunk_index: u32,
        total_chunks: u32,
        origem: &str,
    ) -> std::result::Result<EditalFields, String> {
        let prompt = build_prompt(chunk, chunk_index, total_chunks, origem);
        let messages = [LlmMessage::user(prompt)];
        let mut last_raw = String::new();

        for attempt in 0..=MAX_CHUNK_RETRIES {
            debug!(chunk_index, total_chunks, attempt, "Extracting chunk");

            match self.chat.complete(&messages, 0.0, None).await {
                Ok(reply) => match parse_chunk_reply(&reply) {
                    Ok(fields) => return Ok(fields),
                    Err(raw) => {
                        warn!(chunk_index, attempt, "LLM reply is not valid JSON");
                        last_raw = raw;
                    }
                },
                Err(e) => {
                    warn!(chunk_index, attempt, error = %e, "LLM request failed");
                    last_raw = e.to_string();
                }
            }
        }

        Err(last_raw)
    }

    /// Vector-index one text chunk under its deterministic id. Index
    /// failures are logged and swallowed: retrieval quality degrades, the
    /// extraction does not.
    #[allow(clippy::too_many_arguments)]
    async fn index_chunk(
        &self,
        chunk: &str,
        edital_uuid: &str,
        chunk_index: u32,
        total_chunks: u32,
        pdf_url: &str,
        origem: &str,
        chunk_vars: &EditalFields,
        accumulated: &EditalFields,
    ) {
        let edital_name = chunk_vars
            .apelido_edital
            .clone()
            .or_else(|| accumulated.apelido_edital.clone())
            .unwrap_or_else(|| format!("Edital {}", origem));

        let mut metadata = Map::new();
        if let Some(financiador) = chunk_vars
            .financiador_1
            .clone()
            .or_else(|| chunk_vars.financiador_2.clone())
        {
            metadata.insert("financiador".into(), json!(financiador));
        }
        if let Some(area) = &chunk_vars.area_foco {
            metadata.insert("area_foco".into(), json!(area));
        }
        metadata.insert("link".into(), json!(pdf_url));

        if let Err(e) = self
            .vector
            .add_chunk(
                chunk,
                edital_uuid,
                &edital_name,
                chunk_index,
                total_chunks,
                metadata,
            )
            .await
        {
            warn!(edital_uuid, chunk_index, error = %e, "Vector indexing failed for chunk");
        }
    }
}

/// Parse one LLM reply into the schema. Err carries the raw reply.
pub fn parse_chunk_reply(reply: &str) -> std::result::Result<EditalFields, String> {
    let cleaned = strip_code_fences(reply);

    let value: Value = serde_json::from_str(&cleaned).map_err(|_| reply.to_string())?;
    EditalFields::from_llm_value(&value).ok_or_else(|| reply.to_string())
}

/// The strict-JSON extraction prompt, in Portuguese like the documents
pub fn build_prompt(chunk: &str, chunk_index: u32, total_chunks: u32, origem: &str) -> String {
    format!(
        r#"Você é um extrator de informações de editais de fomento à pesquisa ({origem}).
Extraia os seguintes campos em formato JSON válido:

{{
  "apelido_edital": "STRING",
  "financiador_1": "STRING",
  "financiador_2": "STRING",
  "area_foco": "STRING",
  "tipo_proponente": "STRING",
  "empresas_que_podem_submeter": "STRING",
  "duracao_min_meses": "NUMBER",
  "duracao_max_meses": "NUMBER",
  "valor_min_R$": "NUMBER",
  "valor_max_R$": "NUMBER",
  "tipo_recurso": "STRING",
  "recepcao_recursos": "STRING",
  "custeio": "BOOLEAN",
  "capital": "BOOLEAN",
  "contrapartida_min_%": "NUMBER",
  "contrapartida_max_%": "NUMBER",
  "tipo_contrapartida": "STRING",
  "data_inicial_submissao": "YYYY-MM-DD",
  "data_final_submissao": "YYYY-MM-DD",
  "data_resultado": "YYYY-MM-DD",
  "descricao_completa": "STRING",
  "origem": "{origem}",
  "observacoes": "STRING"
}}

Se algum campo não estiver presente neste trecho, preencha com null.
Retorne APENAS o JSON, sem texto adicional.

Texto do edital (trecho {chunk_index}/{total_chunks}):
{chunk}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_every_schema_field() {
        let prompt = build_prompt("texto do edital", 2, 5, "CNPq");
        for field in [
            "apelido_edital",
            "financiador_1",
            "financiador_2",
            "area_foco",
            "tipo_proponente",
            "empresas_que_podem_submeter",
            "duracao_min_meses",
            "duracao_max_meses",
            "valor_min_R$",
            "valor_max_R$",
            "tipo_recurso",
            "recepcao_recursos",
            "custeio",
            "capital",
            "contrapartida_min_%",
            "contrapartida_max_%",
            "tipo_contrapartida",
            "data_inicial_submissao",
            "data_final_submissao",
            "data_resultado",
            "descricao_completa",
            "origem",
            "observacoes",
        ] {
            assert!(prompt.contains(field), "prompt missing {field}");
        }
        assert!(prompt.contains("trecho 2/5"));
        assert!(prompt.contains("CNPq"));
    }

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "```json\n{\"apelido_edital\": \"Universal 2025\", \"custeio\": true}\n```";
        let fields = parse_chunk_reply(reply).unwrap();
        assert_eq!(fields.apelido_edital.as_deref(), Some("Universal 2025"));
        assert_eq!(fields.custeio, Some(true));
    }

    #[test]
    fn test_parse_plain_reply() {
        let reply = r#"{"financiador_1": "FINEP", "valor_max_R$": 2000000}"#;
        let fields = parse_chunk_reply(reply).unwrap();
        assert_eq!(fields.financiador_1.as_deref(), Some("FINEP"));
        assert_eq!(fields.valor_max_reais, Some(2_000_000.0));
    }

    #[test]
    fn test_parse_garbage_returns_raw() {
        let reply = "Desculpe, não consigo extrair os campos deste trecho.";
        let err = parse_chunk_reply(reply).unwrap_err();
        assert_eq!(err, reply);
    }

    #[test]
    fn test_parse_null_literals_become_nulls() {
        let reply = r#"{"apelido_edital": "null", "area_foco": "Saúde"}"#;
        let fields = parse_chunk_reply(reply).unwrap();
        assert_eq!(fields.apelido_edital, None);
        assert_eq!(fields.area_foco.as_deref(), Some("Saúde"));
    }
}
