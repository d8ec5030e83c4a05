//! CONFAP adapter
//!
//! Index page of running calls where each row ends in a "Ver detalhes"
//! link; the detail page carries the actual artifacts behind hrefs
//! containing "download" (with a `.pdf` fallback). Date filtering works on
//! the year found in the title.

use crate::fetcher::{FetchOptions, HttpFetcher};
use crate::sources::dates::extract_year;
use crate::sources::{absolutize, dedupe_by_url, CallRef, SourceAdapter, SourceTag};
use async_trait::async_trait;
use chrono::{Datelike, Local};
use fomentos_common::errors::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

const LISTING_URL: &str = "https://confap.org.br/pt/editais/status=em-andamento";
const SITE_ORIGIN: &str = "https://confap.org.br";

pub struct ConfapAdapter {
    listing_url: String,
}

impl Default for ConfapAdapter {
    fn default() -> Self {
        Self {
            listing_url: LISTING_URL.to_string(),
        }
    }
}

fn parse_listing(html: &str) -> Vec<CallRef> {
    let document = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").expect("selector");
    let heading_sel = Selector::parse("h2, h3, h4").expect("selector");

    let mut calls = Vec::new();

    for link in document.select(&link_sel) {
        let text = link.text().collect::<String>();
        if !text.to_lowercase().contains("ver detalhes") {
            continue;
        }

        let href = link.value().attr("href").unwrap_or_default();
        let Some(detail_url) = absolutize(SITE_ORIGIN, href) else {
            continue;
        };

        // Title usually lives in a heading of the enclosing card
        let mut titulo = None;
        for ancestor in link.ancestors().filter_map(ElementRef::wrap) {
            if matches!(
                ancestor.value().name(),
                "div" | "article" | "section" | "li"
            ) {
                if let Some(heading) = ancestor.select(&heading_sel).next() {
                    let t = heading.text().collect::<String>().trim().to_string();
                    if !t.is_empty() {
                        titulo = Some(t);
                        break;
                    }
                }
            }
        }
        let titulo = titulo.unwrap_or_else(|| text.trim().to_string());
        let ano = extract_year(&titulo);

        calls.push(CallRef {
            titulo,
            url: detail_url,
            pdf_urls: Vec::new(),
            descricao: None,
            data_limite: None,
            ano,
        });
    }

    dedupe_by_url(calls)
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
            None => {
                debug!(titulo = %call.titulo, "Admitted: no extractable year");
                true
            }
        })
        .collect()
}

/// Extract artifact links from a detail page
fn parse_detail(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").expect("selector");

    let mut downloads = Vec::new();
    let mut pdfs = Vec::new();

    for link in document.select(&link_sel) {
        let href = link.value().attr("href").unwrap_or_default();
        let lower = href.to_lowercase();

        if lower.contains("download") {
            if let Some(url) = absolutize(SITE_ORIGIN, href) {
                if !downloads.contains(&url) {
                    downloads.push(url);
                }
            }
        } else if lower.ends_with(".pdf") {
            if let Some(url) = absolutize(SITE_ORIGIN, href) {
                if !pdfs.contains(&url) {
                    pdfs.push(url);
                }
            }
        }
    }

    // Prefer the download endpoints; fall back to plain PDF links
    if downloads.is_empty() {
        pdfs
    } else {
        downloads
    }
}

#[async_trait]
impl SourceAdapter for ConfapAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::Confap
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
        info!(count = admitted.len(), filter_by_date, "CONFAP editais discovered");
        Ok(admitted)
    }

    async fn list_pdfs(&self, fetcher: &HttpFetcher, call: &CallRef) -> Result<Vec<String>> {
        let page = fetcher
            .fetch(&call.url, &FetchOptions::listing())
            .await
            .map_err(fomentos_common::errors::AppError::from)?;

        let links = parse_detail(&page.text());
        debug!(detail_url = %call.url, count = links.len(), "CONFAP download links");
        Ok(links)
    }

    fn flat_listing(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_FIXTURE: &str = r#"
        <html><body>
          <div class="edital-card">
            <h3>Chamada CONFAP-MCTI 2025 - Centros de Pesquisa</h3>
            <span>Em andamento</span>
            <a href="/pt/editais/chamada-confap-mcti-2025">Ver detalhes</a>
          </div>
          <div class="edital-card">
            <h3>Edital CONFAP 12/2019 - Encerrando</h3>
            <a href="/pt/editais/edital-12-2019">Ver detalhes</a>
          </div>
          <div class="edital-card">
            <h3>Chamada sem ano no título</h3>
            <a href="/pt/editais/chamada-sem-ano">Ver detalhes</a>
          </div>
          <a href="/pt/noticias/ultimas">Notícias</a>
        </body></html>
    "#;

    #[test]
    fn test_parse_listing_detail_links() {
        let calls = parse_listing(LISTING_FIXTURE);
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0].url,
            "https://confap.org.br/pt/editais/chamada-confap-mcti-2025"
        );
        assert_eq!(
            calls[0].titulo,
            "Chamada CONFAP-MCTI 2025 - Centros de Pesquisa"
        );
        assert_eq!(calls[0].ano, Some(2025));
        assert!(calls[0].pdf_urls.is_empty());
    }

    #[test]
    fn test_year_filter_admits_unparsable() {
        let calls = parse_listing(LISTING_FIXTURE);
        let admitted = filter_calls(calls, true, 2025);

        let titles: Vec<&str> = admitted.iter().map(|c| c.titulo.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Chamada CONFAP-MCTI 2025 - Centros de Pesquisa",
                "Chamada sem ano no título",
            ]
        );
    }

    #[test]
    fn test_parse_detail_prefers_download_links() {
        let html = r#"
            <html><body>
              <a href="/pt/download?file=edital-completo">Baixar edital</a>
              <a href="/docs/anexo-1.pdf">Anexo 1</a>
            </body></html>
        "#;
        let links = parse_detail(html);
        assert_eq!(links, vec![
            "https://confap.org.br/pt/download?file=edital-completo".to_string()
        ]);
    }

    #[test]
    fn test_parse_detail_falls_back_to_pdfs() {
        let html = r#"
            <html><body>
              <a href="/docs/edital.pdf">Edital</a>
              <a href="/docs/anexo.pdf">Anexo</a>
              <a href="/pt/sobre">Sobre</a>
            </body></html>
        "#;
        let links = parse_detail(html);
        assert_eq!(links.len(), 2);
        assert!(links[0].ends_with("edital.pdf"));
    }
}
