//! Paraíba Gov (SECTIES) adapter
//!
//! The secretariat publishes a flat page of links pointing straight at
//! PDFs. Deadlines, when present, are embedded in the link text, often with
//! dotted dates ("09.06.25").

use crate::fetcher::{FetchOptions, HttpFetcher};
use crate::sources::dates::extract_deadline;
use crate::sources::{absolutize, dedupe_by_url, CallRef, SourceAdapter, SourceTag};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use fomentos_common::errors::Result;
use scraper::{Html, Selector};
use tracing::{debug, info};

const LISTING_URL: &str = "https://paraiba.pb.gov.br/diretas/secretaria-da-ciencia-tecnologia-inovacao-e-ensino-superior/edital";

pub struct ParaibaGovAdapter {
    listing_url: String,
}

impl Default for ParaibaGovAdapter {
    fn default() -> Self {
        Self {
            listing_url: LISTING_URL.to_string(),
        }
    }
}

fn parse_listing(html: &str, base: &str) -> Vec<CallRef> {
    let document = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").expect("selector");

    let mut calls = Vec::new();

    for link in document.select(&link_sel) {
        let href = link.value().attr("href").unwrap_or_default();
        if !href.to_lowercase().contains(".pdf") {
            continue;
        }

        let Some(pdf_url) = absolutize(base, href) else {
            continue;
        };

        let titulo = link.text().collect::<String>().trim().to_string();
        if titulo.is_empty() {
            continue;
        }

        let data_limite = extract_deadline(&titulo);

        calls.push(CallRef {
            titulo: titulo.clone(),
            url: pdf_url.clone(),
            pdf_urls: vec![pdf_url],
            descricao: Some(titulo),
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

#[async_trait]
impl SourceAdapter for ParaibaGovAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::ParaibaGov
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
        let admitted = filter_calls(calls, filter_by_date, Local::now().date_naive());
        info!(count = admitted.len(), filter_by_date, "Paraíba Gov editais discovered");
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><body>
          <ul>
            <li><a href="/arquivos/edital-secties-01-2025.pdf">
              Edital SECTIES 01/2025 - inscrições até 20.11.2025
            </a></li>
            <li><a href="/arquivos/edital-secties-02-2024.pdf">
              Edital SECTIES 02/2024 - submissões até 15/01/2025
            </a></li>
            <li><a href="/arquivos/resultado-preliminar.pdf">
              Resultado preliminar do edital de bolsas
            </a></li>
            <li><a href="/paginas/sobre">Sobre a secretaria</a></li>
            <li><a href="/arquivos/edital-secties-01-2025.pdf">
              Edital SECTIES 01/2025 - inscrições até 20.11.2025
            </a></li>
          </ul>
        </body></html>
    "#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[test]
    fn test_parse_only_pdf_links() {
        let calls = parse_listing(FIXTURE, LISTING_URL);
        // Four PDF links minus one duplicate
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.pdf_urls[0].ends_with(".pdf")));
        assert!(calls[0].url.starts_with("https://paraiba.pb.gov.br/"));
    }

    #[test]
    fn test_dotted_date_deadline() {
        let calls = parse_listing(FIXTURE, LISTING_URL);
        assert_eq!(
            calls[0].data_limite,
            Some(NaiveDate::from_ymd_opt(2025, 11, 20).unwrap())
        );
    }

    #[test]
    fn test_filter_keeps_open_and_dateless() {
        let calls = parse_listing(FIXTURE, LISTING_URL);
        let admitted = filter_calls(calls, true, today());
        // Open deadline + no-date row; the expired 15/01/2025 one is gone
        assert_eq!(admitted.len(), 2);
        assert!(admitted.iter().any(|c| c.data_limite.is_none()));
    }
}
