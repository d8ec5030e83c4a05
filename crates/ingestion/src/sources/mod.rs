//! Per-agency source adapters
//!
//! Every agency implements the same contract: list candidate calls from its
//! public listing, optionally expand a call's detail page into PDF links,
//! and surface metadata used to enrich the final record. The orchestrator
//! only ever talks to the trait, so new agencies are added by registering
//! another adapter.

pub mod dates;

pub mod capes;
pub mod cnpq;
pub mod confap;
pub mod facepe;
pub mod fapesq;
pub mod finep;
pub mod paraiba;

use crate::fetcher::HttpFetcher;
use async_trait::async_trait;
use chrono::NaiveDate;
use fomentos_common::errors::Result;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Configured agencies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceTag {
    Cnpq,
    Fapesq,
    Facepe,
    ParaibaGov,
    Confap,
    Capes,
    Finep,
}

impl SourceTag {
    /// Stable identifier used in job names, routes and cron ids
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Cnpq => "cnpq",
            SourceTag::Fapesq => "fapesq",
            SourceTag::Facepe => "facepe",
            SourceTag::ParaibaGov => "paraiba_gov",
            SourceTag::Confap => "confap",
            SourceTag::Capes => "capes",
            SourceTag::Finep => "finep",
        }
    }

    /// Agency tag stored on ingested records
    pub fn origem(&self) -> &'static str {
        match self {
            SourceTag::Cnpq => "CNPq",
            SourceTag::Fapesq => "FAPESQ",
            SourceTag::Facepe => "FACEPE",
            SourceTag::ParaibaGov => "Paraíba Gov",
            SourceTag::Confap => "CONFAP",
            SourceTag::Capes => "CAPES",
            SourceTag::Finep => "FINEP",
        }
    }

    /// Default funder name recorded as financiador_1
    pub fn financiador(&self) -> &'static str {
        match self {
            SourceTag::Cnpq => "CNPq",
            SourceTag::Fapesq => "FAPESQ-PB",
            SourceTag::Facepe => "FACEPE",
            SourceTag::ParaibaGov => "Governo da Paraíba - SECTIES",
            SourceTag::Confap => "CONFAP",
            SourceTag::Capes => "CAPES",
            SourceTag::Finep => "FINEP",
        }
    }

    pub fn parse(s: &str) -> Option<SourceTag> {
        match s {
            "cnpq" => Some(SourceTag::Cnpq),
            "fapesq" => Some(SourceTag::Fapesq),
            "facepe" => Some(SourceTag::Facepe),
            "paraiba_gov" => Some(SourceTag::ParaibaGov),
            "confap" => Some(SourceTag::Confap),
            "capes" => Some(SourceTag::Capes),
            "finep" => Some(SourceTag::Finep),
            _ => None,
        }
    }

    pub fn all() -> &'static [SourceTag] {
        &[
            SourceTag::Cnpq,
            SourceTag::Fapesq,
            SourceTag::Facepe,
            SourceTag::ParaibaGov,
            SourceTag::Confap,
            SourceTag::Capes,
            SourceTag::Finep,
        ]
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate call discovered on a listing page
#[derive(Clone, Debug)]
pub struct CallRef {
    pub titulo: String,
    /// Listing row target: the PDF itself or a detail page
    pub url: String,
    /// PDFs already resolved at listing time; empty when a detail fetch is
    /// required (see `SourceAdapter::list_pdfs`)
    pub pdf_urls: Vec<String>,
    pub descricao: Option<String>,
    pub data_limite: Option<NaiveDate>,
    pub ano: Option<i32>,
}

/// Source metadata merged into the final record after extraction
#[derive(Clone, Debug, Default)]
pub struct CallMetadata {
    pub apelido_edital: Option<String>,
    pub financiador_1: Option<String>,
    pub origem: Option<String>,
    pub descricao: Option<String>,
    pub data_limite: Option<NaiveDate>,
    pub ano: Option<i32>,
    pub url_detalhes: Option<String>,
}

/// Common contract implemented by every agency adapter
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn tag(&self) -> SourceTag;

    /// The public listing this adapter scrapes
    fn listing_url(&self) -> &str;

    /// Discover candidate calls. With `filter_by_date`, calls whose
    /// extractable date is >= today are admitted, as are calls whose date
    /// could not be extracted (the LLM stage is authoritative).
    async fn list_calls(&self, fetcher: &HttpFetcher, filter_by_date: bool)
        -> Result<Vec<CallRef>>;

    /// Resolve a call into PDF URLs. The default covers adapters whose
    /// listing already yields PDFs directly.
    async fn list_pdfs(&self, _fetcher: &HttpFetcher, call: &CallRef) -> Result<Vec<String>> {
        Ok(call.pdf_urls.clone())
    }

    /// Metadata used to enrich the final record
    fn metadata(&self, call: &CallRef) -> CallMetadata {
        CallMetadata {
            apelido_edital: Some(call.titulo.clone()),
            financiador_1: Some(self.tag().financiador().to_string()),
            origem: Some(self.tag().origem().to_string()),
            descricao: call.descricao.clone(),
            data_limite: call.data_limite,
            ano: call.ano,
            url_detalhes: Some(call.url.clone()),
        }
    }

    /// Whether the PDF total is known right after listing. Adapters that
    /// expand detail pages (CONFAP, FINEP) grow the total as they go.
    fn flat_listing(&self) -> bool {
        true
    }
}

/// All configured adapters
pub fn registry() -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(cnpq::CnpqAdapter::default()),
        Arc::new(fapesq::FapesqAdapter::default()),
        Arc::new(facepe::FacepeAdapter::default()),
        Arc::new(paraiba::ParaibaGovAdapter::default()),
        Arc::new(confap::ConfapAdapter::default()),
        Arc::new(capes::CapesAdapter::default()),
        Arc::new(finep::FinepAdapter::default()),
    ]
}

/// Look up one adapter by its tag
pub fn adapter_for(tag: SourceTag) -> Arc<dyn SourceAdapter> {
    registry()
        .into_iter()
        .find(|a| a.tag() == tag)
        .expect("every tag has a registered adapter")
}

/// Query parameters that only track the visitor and break URL dedup
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid"];

/// Normalize a scraped href to an absolute URL against the listing origin.
/// Strips fragments and tracking query parameters.
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let base_url = Url::parse(base).ok()?;
    let mut joined = base_url.join(href.trim()).ok()?;

    joined.set_fragment(None);

    let kept: Vec<(String, String)> = joined
        .query_pairs()
        .filter(|(key, _)| {
            !TRACKING_PARAMS.contains(&key.as_ref()) && !key.starts_with("utm_")
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        joined.set_query(None);
    } else {
        let query: String = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        joined.set_query(Some(&query));
    }

    Some(joined.to_string())
}

/// Drop calls whose absolute URL repeats within a run
pub fn dedupe_by_url(calls: Vec<CallRef>) -> Vec<CallRef> {
    let mut seen = HashSet::new();
    calls
        .into_iter()
        .filter(|call| seen.insert(call.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for tag in SourceTag::all() {
            assert_eq!(SourceTag::parse(tag.as_str()), Some(*tag));
        }
        assert_eq!(SourceTag::parse("desconhecido"), None);
    }

    #[test]
    fn test_registry_covers_all_tags() {
        let registry = registry();
        assert_eq!(registry.len(), SourceTag::all().len());
        for tag in SourceTag::all() {
            assert!(registry.iter().any(|a| a.tag() == *tag));
        }
    }

    #[test]
    fn test_absolutize_relative_href() {
        let abs = absolutize("https://confap.org.br/pt/editais", "/pt/editais/42").unwrap();
        assert_eq!(abs, "https://confap.org.br/pt/editais/42");
    }

    #[test]
    fn test_absolutize_strips_tracking_and_fragment() {
        let abs = absolutize(
            "https://fapesq.rpp.br/editais",
            "https://fapesq.rpp.br/edital.pdf?utm_source=news&id=7#topo",
        )
        .unwrap();
        assert_eq!(abs, "https://fapesq.rpp.br/edital.pdf?id=7");
    }

    #[test]
    fn test_absolutize_keeps_meaningful_query() {
        let abs = absolutize(
            "http://www.finep.gov.br/chamadas-publicas",
            "?situacao=aberta",
        )
        .unwrap();
        assert!(abs.contains("situacao=aberta"));
    }

    #[test]
    fn test_dedupe_by_url() {
        let call = |url: &str| CallRef {
            titulo: "t".into(),
            url: url.into(),
            pdf_urls: vec![],
            descricao: None,
            data_limite: None,
            ano: None,
        };
        let calls = vec![call("https://a/1"), call("https://a/2"), call("https://a/1")];
        assert_eq!(dedupe_by_url(calls).len(), 2);
    }
}
