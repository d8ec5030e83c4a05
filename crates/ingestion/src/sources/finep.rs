//! FINEP adapter
//!
//! Index of open calls with one link per call into a numbered detail page
//! (`/chamadas-publicas/chamadapublica/<id>`); the detail page links the
//! actual PDFs. Deadlines appear in the text of the listing row.

use crate::fetcher::{FetchOptions, HttpFetcher};
use crate::sources::dates::{extract_deadline, parse_br_date};
use crate::sources::{absolutize, dedupe_by_url, CallRef, SourceAdapter, SourceTag};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use fomentos_common::errors::Result;
use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

const LISTING_URL: &str = "http://www.finep.gov.br/chamadas-publicas?situacao=aberta";
const SITE_ORIGIN: &str = "http://www.finep.gov.br";

pub struct FinepAdapter {
    listing_url: String,
}

impl Default for FinepAdapter {
    fn default() -> Self {
        Self {
            listing_url: LISTING_URL.to_string(),
        }
    }
}

/// Last date in a row of text; FINEP rows list the window end last
fn last_date_in(text: &str) -> Option<NaiveDate> {
    let re = Regex::new(r"\d{2}[/.]\d{2}[/.]\d{4}").expect("pattern");
    let mut last = None;
    for m in re.find_iter(text) {
        last = parse_br_date(m.as_str()).or(last);
    }
    last.or_else(|| extract_deadline(text))
}

fn parse_listing(html: &str) -> Vec<CallRef> {
    let document = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").expect("selector");
    let call_re = Regex::new(r"/chamadas-publicas/chamadapublica/\d+").expect("pattern");

    let mut calls = Vec::new();

    for link in document.select(&link_sel) {
        let href = link.value().attr("href").unwrap_or_default();
        if !call_re.is_match(href) {
            continue;
        }

        let Some(detail_url) = absolutize(SITE_ORIGIN, href) else {
            continue;
        };

        let titulo = link.text().collect::<String>().trim().to_string();
        if titulo.is_empty() {
            continue;
        }

        // The deadline sits in the enclosing row's text
        let row_text = link
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| matches!(a.value().name(), "li" | "tr" | "div" | "article"))
            .map(|row| row.text().collect::<String>())
            .unwrap_or_else(|| titulo.clone());

        let data_limite = last_date_in(&row_text);

        calls.push(CallRef {
            titulo,
            url: detail_url,
            pdf_urls: Vec::new(),
            descricao: None,
            data_limite,
            ano: None,
        });
    }

    dedupe_by_url(calls)
}

fn filter_calls(calls: Vec<CallRef>, filter_by_date: bool, today: NaiveDate) -> Vec<CallRef> {
    if !filter_by_date {
        return calls;
    }

    calls
        .into_iter()
        .filter(|call| match call.data_limite {
            Some(deadline) if deadline >= today => {
                debug!(titulo = %call.titulo, %deadline, "Admitted: deadline still open");
                true
            }
            Some(deadline) => {
                debug!(titulo = %call.titulo, %deadline, "Skipped: deadline passed");
                false
            }
            None => {
                debug!(titulo = %call.titulo, "Admitted: no extractable deadline");
                true
            }
        })
        .collect()
}

fn parse_detail(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").expect("selector");

    let mut pdfs = Vec::new();
    for link in document.select(&link_sel) {
        let href = link.value().attr("href").unwrap_or_default();
        if href.to_lowercase().ends_with(".pdf") {
            if let Some(url) = absolutize(SITE_ORIGIN, href) {
                if !pdfs.contains(&url) {
                    pdfs.push(url);
                }
            }
        }
    }
    pdfs
}

#[async_trait]
impl SourceAdapter for FinepAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::Finep
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
        let admitted = filter_calls(calls, filter_by_date, Local::now().date_naive());
        info!(count = admitted.len(), filter_by_date, "FINEP chamadas discovered");
        Ok(admitted)
    }

    async fn list_pdfs(&self, fetcher: &HttpFetcher, call: &CallRef) -> Result<Vec<String>> {
        let page = fetcher
            .fetch(&call.url, &FetchOptions::listing())
            .await
            .map_err(fomentos_common::errors::AppError::from)?;

        let links = parse_detail(&page.text());
        debug!(detail_url = %call.url, count = links.len(), "FINEP PDF links");
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
          <div class="chamada">
            <a href="/chamadas-publicas/chamadapublica/701">
              Chamada Pública MCTI/FINEP - Subvenção 2025
            </a>
            <span>Prazo para envio de propostas: 14/02/2025 a 30/11/2025</span>
          </div>
          <div class="chamada">
            <a href="/chamadas-publicas/chamadapublica/650">
              Chamada FINEP Encerrada
            </a>
            <span>Propostas até 10/01/2025</span>
          </div>
          <div class="chamada">
            <a href="/chamadas-publicas/chamadapublica/702">Chamada sem prazo</a>
          </div>
          <a href="/sobre/institucional">Institucional</a>
        </body></html>
    "#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[test]
    fn test_parse_listing_detail_urls() {
        let calls = parse_listing(LISTING_FIXTURE);
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0].url,
            "http://www.finep.gov.br/chamadas-publicas/chamadapublica/701"
        );
        assert_eq!(
            calls[0].data_limite,
            Some(NaiveDate::from_ymd_opt(2025, 11, 30).unwrap())
        );
    }

    #[test]
    fn test_filter_by_deadline_keeps_dateless() {
        let calls = parse_listing(LISTING_FIXTURE);
        let admitted = filter_calls(calls, true, today());

        let titles: Vec<&str> = admitted.iter().map(|c| c.titulo.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Chamada Pública MCTI/FINEP - Subvenção 2025",
                "Chamada sem prazo",
            ]
        );
    }

    #[test]
    fn test_parse_detail_pdfs() {
        let html = r#"
            <html><body>
              <a href="/arquivos/chamadas/edital_subvencao_2025.pdf">Edital</a>
              <a href="/arquivos/chamadas/anexo_1.pdf">Anexo I</a>
              <a href="/arquivos/chamadas/edital_subvencao_2025.pdf">Edital (de novo)</a>
              <a href="/chamadas-publicas">Voltar</a>
            </body></html>
        "#;
        let pdfs = parse_detail(html);
        assert_eq!(pdfs.len(), 2);
        assert_eq!(
            pdfs[0],
            "http://www.finep.gov.br/arquivos/chamadas/edital_subvencao_2025.pdf"
        );
    }
}
