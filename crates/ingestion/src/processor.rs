//! Per-PDF processing pipeline
//!
//! Download → PDF detection → text extraction → progressive LLM extraction
//! → source-metadata merge + final commit. Identity is per
//! (source, content-hash): a PDF whose bytes were already ingested for the
//! same agency is skipped instead of re-extracted.

use crate::extractor::VariableExtractor;
use crate::fetcher::{FetchOptions, HttpFetcher};
use crate::pdf::PdfExtractor;
use crate::sources::{CallMetadata, SourceTag};
use fomentos_common::auth::content_hash;
use fomentos_common::db::models::{EditalFields, ExtractionStatus};
use fomentos_common::db::Repository;
use fomentos_common::errors::{AppError, Result};
use fomentos_common::metrics::record_pdf_processed;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Namespace fixing edital ids to their (source, content-hash) identity.
/// Reprocessing the same bytes yields the same edital id, so vector chunks
/// are replaced by deterministic id instead of duplicated.
const EDITAL_NAMESPACE: Uuid = uuid::uuid!("5aa0b3b9-9a85-4f5f-8c28-6f4f2c4b2a10");

/// Deterministic edital id for one (source, content-hash) pair
pub fn edital_uuid_for(origem: &str, content_hash: &str) -> String {
    Uuid::new_v5(
        &EDITAL_NAMESPACE,
        format!("{}:{}", origem, content_hash).as_bytes(),
    )
    .to_string()
}

/// What happened to one PDF
#[derive(Clone, Debug)]
pub enum ProcessOutcome {
    /// Fully ingested; carries the new edital id
    Processed { edital_uuid: String },
    /// Same (source, content-hash) already completed earlier
    SkippedDuplicate { edital_uuid: String },
}

pub struct EditalProcessor {
    fetcher: Arc<HttpFetcher>,
    pdf: Arc<PdfExtractor>,
    extractor: Arc<VariableExtractor>,
    repo: Repository,
}

impl EditalProcessor {
    pub fn new(
        fetcher: Arc<HttpFetcher>,
        pdf: Arc<PdfExtractor>,
        extractor: Arc<VariableExtractor>,
        repo: Repository,
    ) -> Self {
        Self {
            fetcher,
            pdf,
            extractor,
            repo,
        }
    }

    /// Run one PDF through the whole pipeline
    pub async fn process_pdf(
        &self,
        pdf_url: &str,
        metadata: &CallMetadata,
        source: SourceTag,
    ) -> Result<ProcessOutcome> {
        let fetched = self
            .fetcher
            .fetch(pdf_url, &FetchOptions::pdf())
            .await
            .map_err(AppError::from)?;

        if !fetched.is_pdf {
            record_pdf_processed(source.as_str(), false);
            return Err(AppError::MalformedPdf {
                message: format!("artifact is not a PDF (content-type: {})", fetched.content_type),
            });
        }

        let hash = content_hash(&fetched.bytes);
        if let Some(existing) = self
            .repo
            .find_completed_by_content_hash(source.origem(), &hash)
            .await?
        {
            info!(
                pdf_url,
                edital_uuid = %existing.uuid,
                "Content hash already ingested for this source, skipping"
            );
            return Ok(ProcessOutcome::SkippedDuplicate {
                edital_uuid: existing.uuid,
            });
        }

        let text = self
            .pdf
            .extract_text(fetched.bytes)
            .await
            .map_err(AppError::from)?;
        info!(pdf_url, chars = text.len(), "PDF text extracted");

        let edital_uuid = edital_uuid_for(source.origem(), &hash);
        self.repo
            .create_pending_edital(&edital_uuid, pdf_url, source.origem(), &hash)
            .await?;

        let consolidated = self
            .extractor
            .extract_progressive(&text, &edital_uuid, pdf_url, source.origem())
            .await?;

        // Listing-time metadata is more reliable than model output for the
        // fields the site states outright; re-issue the final commit with it
        let enriched = apply_source_metadata(consolidated, metadata);
        self.repo
            .save_final_extraction(&edital_uuid, &enriched, ExtractionStatus::Completed)
            .await?;

        record_pdf_processed(source.as_str(), true);
        info!(pdf_url, edital_uuid = %edital_uuid, "Edital processed");

        Ok(ProcessOutcome::Processed { edital_uuid })
    }
}

/// Overlay source metadata onto the consolidated schema. Listing metadata
/// wins wherever it is present.
fn apply_source_metadata(mut fields: EditalFields, metadata: &CallMetadata) -> EditalFields {
    if let Some(apelido) = &metadata.apelido_edital {
        if !apelido.trim().is_empty() {
            fields.apelido_edital = Some(apelido.clone());
        }
    }
    if let Some(financiador) = &metadata.financiador_1 {
        fields.financiador_1 = Some(financiador.clone());
    }
    if let Some(origem) = &metadata.origem {
        fields.origem = Some(origem.clone());
    }
    if let Some(data_limite) = metadata.data_limite {
        fields.data_final_submissao = Some(data_limite.format("%Y-%m-%d").to_string());
    }
    if fields.descricao_completa.is_none() {
        if let Some(descricao) = &metadata.descricao {
            fields.descricao_completa = Some(descricao.clone());
        }
    }
    if fields.observacoes.is_none() {
        if let Some(url_detalhes) = &metadata.url_detalhes {
            fields.observacoes = Some(format!("Detalhes: {}", url_detalhes));
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_edital_uuid_is_deterministic_per_source_and_content() {
        let hash = "ab".repeat(32);
        let a = edital_uuid_for("CNPq", &hash);
        let b = edital_uuid_for("CNPq", &hash);
        let other_source = edital_uuid_for("FINEP", &hash);
        let other_content = edital_uuid_for("CNPq", &"cd".repeat(32));

        assert_eq!(a, b);
        assert_ne!(a, other_source);
        assert_ne!(a, other_content);
    }

    #[test]
    fn test_metadata_overrides_extracted_values() {
        let extracted = EditalFields {
            apelido_edital: Some("nome confuso do modelo".into()),
            financiador_1: Some("outro".into()),
            link: Some("https://fapesq.rpp.br/edital.pdf".into()),
            uuid: Some("abc".into()),
            ..Default::default()
        };

        let metadata = CallMetadata {
            apelido_edital: Some("Edital 09/2025 - Bolsas".into()),
            financiador_1: Some("FAPESQ-PB".into()),
            origem: Some("FAPESQ".into()),
            data_limite: NaiveDate::from_ymd_opt(2025, 12, 30),
            ..Default::default()
        };

        let merged = apply_source_metadata(extracted, &metadata);
        assert_eq!(merged.apelido_edital.as_deref(), Some("Edital 09/2025 - Bolsas"));
        assert_eq!(merged.financiador_1.as_deref(), Some("FAPESQ-PB"));
        assert_eq!(merged.origem.as_deref(), Some("FAPESQ"));
        assert_eq!(merged.data_final_submissao.as_deref(), Some("2025-12-30"));
        // System fields survive the overlay
        assert_eq!(merged.link.as_deref(), Some("https://fapesq.rpp.br/edital.pdf"));
        assert_eq!(merged.uuid.as_deref(), Some("abc"));
    }

    #[test]
    fn test_metadata_fills_gaps_without_clobbering() {
        let extracted = EditalFields {
            descricao_completa: Some("descrição extraída do PDF".into()),
            ..Default::default()
        };

        let metadata = CallMetadata {
            descricao: Some("descrição do site".into()),
            ..Default::default()
        };

        let merged = apply_source_metadata(extracted, &metadata);
        // The extracted description is richer; the listing one only fills gaps
        assert_eq!(
            merged.descricao_completa.as_deref(),
            Some("descrição extraída do PDF")
        );
    }
}
