//! CAPES adapter
//!
//! gov.br page with one heading per year ("Chamadas públicas 2025") and the
//! call links grouped below it. Artifact hrefs contain "-pdf" (gov.br slug
//! convention) or end in `.pdf`; the content-type is often wrong, so the
//! fetcher's magic-byte sniff does the final call.

use crate::fetcher::{FetchOptions, HttpFetcher};
use crate::sources::dates::extract_year;
use crate::sources::{absolutize, CallRef, SourceAdapter, SourceTag};
use async_trait::async_trait;
use chrono::{Datelike, Local};
use fomentos_common::errors::Result;
use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

const LISTING_URL: &str = "https://www.gov.br/capes/pt-br/acesso-a-informacao/licitacoes-e-contratos/chamadas-publicas/chamadas";
const SITE_ORIGIN: &str = "https://www.gov.br";

pub struct CapesAdapter {
    listing_url: String,
}

impl Default for CapesAdapter {
    fn default() -> Self {
        Self {
            listing_url: LISTING_URL.to_string(),
        }
    }
}

fn is_artifact_href(href: &str) -> bool {
    let lower = href.to_lowercase();
    lower.contains("-pdf") || lower.ends_with(".pdf")
}

/// One call per year section, carrying every artifact link of the section
fn parse_listing(html: &str) -> Vec<CallRef> {
    let document = Html::parse_document(html);
    let heading_sel = Selector::parse("h2, h3").expect("selector");
    let link_sel = Selector::parse("a[href]").expect("selector");
    let section_re = Regex::new(r"(?i)chamadas p[uú]blicas\s+\d{4}").expect("pattern");

    let mut calls = Vec::new();

    for heading in document.select(&heading_sel) {
        let section_text = heading.text().collect::<String>().trim().to_string();
        if !section_re.is_match(&section_text) {
            continue;
        }

        let Some(ano) = extract_year(&section_text) else {
            continue;
        };

        // Links live in the next element sibling; fall back to the parent
        // container when the markup flattens them
        let container = heading
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .next()
            .or_else(|| heading.parent().and_then(ElementRef::wrap));

        let Some(container) = container else {
            continue;
        };

        let mut pdf_urls = Vec::new();
        for link in container.select(&link_sel) {
            let href = link.value().attr("href").unwrap_or_default();
            if is_artifact_href(href) {
                if let Some(url) = absolutize(SITE_ORIGIN, href) {
                    if !pdf_urls.contains(&url) {
                        pdf_urls.push(url);
                    }
                }
            }
        }

        if pdf_urls.is_empty() {
            debug!(section = %section_text, "No artifact links in section");
            continue;
        }

        calls.push(CallRef {
            titulo: section_text,
            url: LISTING_URL.to_string(),
            pdf_urls,
            descricao: None,
            data_limite: None,
            ano: Some(ano),
        });
    }

    calls
}

fn filter_calls(calls: Vec<CallRef>, filter_by_date: bool, current_year: i32) -> Vec<CallRef> {
    if !filter_by_date {
        return calls;
    }

    calls
        .into_iter()
        .filter(|call| match call.ano {
            Some(ano) if ano >= current_year => {
                debug!(titulo = %call.titulo, ano, "Admitted: current or future year");
                true
            }
            Some(ano) => {
                debug!(titulo = %call.titulo, ano, "Skipped: past year");
                false
            }
            None => true,
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for CapesAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::Capes
    }

    fn listing_url(&self) -> &str {
        &self.listing_url
    }

    async fn list_calls(
        &self,
        fetcher: &HttpFetcher,
        filter_by_date: bool,
    ) -> Result<Vec<CallRef>> {
        let page = fetcher
            .fetch(&self.listing_url, &FetchOptions::listing())
            .await
            .map_err(fomentos_common::errors::AppError::from)?;

        let calls = parse_listing(&page.text());
        let admitted = filter_calls(calls, filter_by_date, Local::now().year());
        let pdf_total: usize = admitted.iter().map(|c| c.pdf_urls.len()).sum();
        info!(
            sections = admitted.len(),
            pdfs = pdf_total,
            filter_by_date,
            "CAPES chamadas discovered"
        );
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><body>
          <h3>Chamadas públicas 2025</h3>
          <div>
            <p><a href="/capes/pt-br/chamada-01-2025-pdf">Chamada 01/2025</a></p>
            <p><a href="/capes/pt-br/chamada-02-2025-pdf">Chamada 02/2025</a></p>
            <p><a href="/capes/pt-br/noticia-qualquer">Notícia</a></p>
          </div>
          <h3>Chamadas públicas 2023</h3>
          <div>
            <p><a href="/capes/pt-br/arquivos/chamada-07-2023.pdf">Chamada 07/2023</a></p>
          </div>
          <h3>Contratos vigentes</h3>
          <div>
            <p><a href="/capes/pt-br/contrato-pdf">Contrato</a></p>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_sections_by_year() {
        let calls = parse_listing(FIXTURE);
        assert_eq!(calls.len(), 2);

        assert_eq!(calls[0].titulo, "Chamadas públicas 2025");
        assert_eq!(calls[0].ano, Some(2025));
        assert_eq!(calls[0].pdf_urls.len(), 2);
        assert_eq!(
            calls[0].pdf_urls[0],
            "https://www.gov.br/capes/pt-br/chamada-01-2025-pdf"
        );

        assert_eq!(calls[1].ano, Some(2023));
    }

    #[test]
    fn test_year_filter_drops_old_sections() {
        let calls = parse_listing(FIXTURE);
        let admitted = filter_calls(calls, true, 2025);
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].ano, Some(2025));
    }

    #[test]
    fn test_artifact_href_detection() {
        assert!(is_artifact_href("/capes/chamada-01-pdf"));
        assert!(is_artifact_href("/arquivo/edital.PDF"));
        assert!(!is_artifact_href("/capes/noticias"));
    }
}
