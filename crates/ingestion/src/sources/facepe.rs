//! FACEPE adapter
//!
//! The Pernambuco foundation lists open calls as rows whose links point
//! straight at PDFs, with the submission window in the row text. Same shape
//! as FAPESQ, different markup.

use crate::fetcher::{FetchOptions, HttpFetcher};
use crate::sources::dates::extract_deadline;
use crate::sources::{absolutize, dedupe_by_url, CallRef, SourceAdapter, SourceTag};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use fomentos_common::errors::Result;
use scraper::{Html, Selector};
use tracing::{debug, info};

const LISTING_URL: &str = "https://www.facepe.br/editais/abertos/";

pub struct FacepeAdapter {
    listing_url: String,
}

impl Default for FacepeAdapter {
    fn default() -> Self {
        Self {
            listing_url: LISTING_URL.to_string(),
        }
    }
}

fn parse_listing(html: &str, base: &str) -> Vec<CallRef> {
    let document = Html::parse_document(html);
    let item_sel = Selector::parse("div.edital-item, li.edital, article").expect("selector");
    let link_sel = Selector::parse("a[href]").expect("selector");

    let mut calls = Vec::new();

    for item in document.select(&item_sel) {
        let Some(link) = item.select(&link_sel).find(|l| {
            l.value()
                .attr("href")
                .map(|h| h.to_lowercase().ends_with(".pdf"))
                .unwrap_or(false)
        }) else {
            continue;
        };

        let href = link.value().attr("href").unwrap_or_default();
        let Some(pdf_url) = absolutize(base, href) else {
            continue;
        };

        let titulo = link.text().collect::<String>().trim().to_string();
        let row_text = item.text().collect::<String>();
        let descricao = Some(row_text.split_whitespace().collect::<Vec<_>>().join(" "));
        let data_limite = descricao.as_deref().and_then(extract_deadline);

        calls.push(CallRef {
            titulo: if titulo.is_empty() {
                "Edital FACEPE".to_string()
            } else {
                titulo
            },
            url: pdf_url.clone(),
            pdf_urls: vec![pdf_url],
            descricao,
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
impl SourceAdapter for FacepeAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::Facepe
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
        info!(count = admitted.len(), filter_by_date, "FACEPE editais discovered");
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><body>
          <div class="edital-item">
            <a href="/wp-content/uploads/edital-apq-04-2025.pdf">APQ 04/2025</a>
            <p>Auxílio a Projetos de Pesquisa. Submissões até 31/10/2025.</p>
          </div>
          <div class="edital-item">
            <a href="/wp-content/uploads/edital-bic-01-2024.pdf">BIC 01/2024</a>
            <p>Bolsas de iniciação científica, até 01/02/2025.</p>
          </div>
          <div class="edital-item">
            <a href="/paginas/resultado">Resultado</a>
          </div>
        </body></html>
    "#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[test]
    fn test_parse_listing_pdf_rows_only() {
        let calls = parse_listing(FIXTURE, LISTING_URL);
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].pdf_urls[0],
            "https://www.facepe.br/wp-content/uploads/edital-apq-04-2025.pdf"
        );
        assert_eq!(calls[0].titulo, "APQ 04/2025");
    }

    #[test]
    fn test_filter_by_deadline() {
        let calls = parse_listing(FIXTURE, LISTING_URL);
        let admitted = filter_calls(calls, true, today());
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].titulo, "APQ 04/2025");
    }
}
