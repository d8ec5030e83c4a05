//! CNPq adapter
//!
//! Single index page of open calls. Each call row carries a "Chamada"
//! button inside a `div.links-normas` whose href points straight at the
//! artifact (PDF or HTML detail). No date filtering is possible at listing
//! time; admission is decided by the LLM stage.

use crate::fetcher::{FetchOptions, HttpFetcher};
use crate::sources::{absolutize, dedupe_by_url, CallRef, SourceAdapter, SourceTag};
use async_trait::async_trait;
use fomentos_common::errors::Result;
use scraper::{Html, Selector};
use tracing::{debug, info};

const LISTING_URL: &str = "http://memoria2.cnpq.br/web/guest/chamadas-publicas?p_p_id=resultadosportlet_WAR_resultadoscnpqportlet_INSTANCE_0ZaM&filtro=abertas";

pub struct CnpqAdapter {
    listing_url: String,
}

impl Default for CnpqAdapter {
    fn default() -> Self {
        Self {
            listing_url: LISTING_URL.to_string(),
        }
    }
}

/// Pull the "Chamada" buttons out of the listing HTML
fn parse_listing(html: &str, base: &str) -> Vec<CallRef> {
    let document = Html::parse_document(html);
    let row_sel = Selector::parse("div.links-normas").expect("selector");
    let btn_sel = Selector::parse("a.btn[href]").expect("selector");

    let mut calls = Vec::new();

    for (idx, row) in document.select(&row_sel).enumerate() {
        if let Some(link) = row.select(&btn_sel).next() {
            let href = link.value().attr("href").unwrap_or_default();
            if let Some(url) = absolutize(base, href) {
                calls.push(CallRef {
                    titulo: format!("Chamada CNPq {}", idx + 1),
                    url: url.clone(),
                    pdf_urls: vec![url],
                    descricao: None,
                    data_limite: None,
                    ano: None,
                });
            }
        }
    }

    // Fallback for layout changes: any link into the results portal
    if calls.is_empty() {
        let fallback_sel = Selector::parse("a[href]").expect("selector");
        for (idx, link) in document
            .select(&fallback_sel)
            .filter(|l| {
                l.value()
                    .attr("href")
                    .map(|h| h.contains("resultado.cnpq.br"))
                    .unwrap_or(false)
            })
            .enumerate()
        {
            let href = link.value().attr("href").unwrap_or_default();
            if let Some(url) = absolutize(base, href) {
                calls.push(CallRef {
                    titulo: format!("Chamada CNPq {}", idx + 1),
                    url: url.clone(),
                    pdf_urls: vec![url],
                    descricao: None,
                    data_limite: None,
                    ano: None,
                });
            }
        }
    }

    dedupe_by_url(calls)
}

#[async_trait]
impl SourceAdapter for CnpqAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::Cnpq
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

        let calls = parse_listing(&page.text(), &self.listing_url);

        if filter_by_date {
            // The CNPq index exposes no dates; everything is admitted and
            // the extractor decides
            debug!("CNPq listing has no extractable dates, admitting all calls");
        }
        info!(count = calls.len(), "CNPq calls discovered");
        Ok(calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><body>
          <div class="resultado">
            <div class="links-normas">
              <a class="btn" href="http://resultado.cnpq.br/chamadas/10-2025.pdf">Chamada</a>
              <a class="btn" href="http://resultado.cnpq.br/chamadas/10-2025-faq">FAQ</a>
            </div>
            <div class="links-normas">
              <a class="btn" href="/web/guest/arquivo/chamada-11-2025.pdf">Chamada</a>
            </div>
            <div class="links-normas">
              <a class="btn" href="http://resultado.cnpq.br/chamadas/10-2025.pdf">Chamada</a>
            </div>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_listing_buttons() {
        let calls = parse_listing(FIXTURE, LISTING_URL);
        // Third row duplicates the first URL and is dropped
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].url,
            "http://resultado.cnpq.br/chamadas/10-2025.pdf"
        );
        // Relative href resolved against the listing origin
        assert_eq!(
            calls[1].url,
            "http://memoria2.cnpq.br/web/guest/arquivo/chamada-11-2025.pdf"
        );
    }

    #[test]
    fn test_parse_listing_fallback() {
        let html = r#"
            <html><body>
              <a href="http://resultado.cnpq.br/chamada/77">Chamada 77</a>
              <a href="https://outro.site/nada">fora</a>
            </body></html>
        "#;
        let calls = parse_listing(html, LISTING_URL);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "http://resultado.cnpq.br/chamada/77");
    }

    #[test]
    fn test_parse_listing_empty_page() {
        assert!(parse_listing("<html></html>", LISTING_URL).is_empty());
    }
}
