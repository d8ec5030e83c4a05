//! FAPESQ-PB adapter
//!
//! Plone-style listing: one `article.tileItem` per edital, linking to a
//! `/view` page whose PDF lives at the same path without the suffix. The
//! submission window is written into the description text.

use crate::fetcher::{FetchOptions, HttpFetcher};
use crate::sources::dates::extract_deadline;
use crate::sources::{absolutize, dedupe_by_url, CallRef, SourceAdapter, SourceTag};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use fomentos_common::errors::Result;
use scraper::{Html, Selector};
use tracing::{debug, info};

const LISTING_URL: &str = "https://fapesq.rpp.br/editais/editais-abertos";

pub struct FapesqAdapter {
    listing_url: String,
}

impl Default for FapesqAdapter {
    fn default() -> Self {
        Self {
            listing_url: LISTING_URL.to_string(),
        }
    }
}

fn parse_listing(html: &str, base: &str) -> Vec<CallRef> {
    let document = Html::parse_document(html);
    let article_sel = Selector::parse("article.tileItem").expect("selector");
    let title_sel = Selector::parse("a.summary.url").expect("selector");
    let desc_sel = Selector::parse("span.description").expect("selector");

    let mut calls = Vec::new();

    for article in document.select(&article_sel) {
        let Some(title_link) = article.select(&title_sel).next() else {
            continue;
        };

        let titulo = title_link.text().collect::<String>().trim().to_string();
        let href = title_link.value().attr("href").unwrap_or_default();
        let Some(view_url) = absolutize(base, href) else {
            continue;
        };

        // .../arquivo.pdf/view -> .../arquivo.pdf
        let pdf_url = view_url
            .strip_suffix("/view")
            .map(String::from)
            .unwrap_or_else(|| view_url.clone());

        let descricao = article
            .select(&desc_sel)
            .next()
            .map(|d| d.text().collect::<String>().trim().to_string());

        let data_limite = descricao.as_deref().and_then(extract_deadline);

        calls.push(CallRef {
            titulo,
            url: view_url,
            pdf_urls: vec![pdf_url],
            descricao,
            data_limite,
            ano: None,
        });
    }

    dedupe_by_url(calls)
}

/// Admission: deadline in the future, or no extractable deadline at all
/// (the LLM stage is authoritative for dates)
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
impl SourceAdapter for FapesqAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::Fapesq
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
        info!(count = admitted.len(), filter_by_date, "FAPESQ editais discovered");
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><body>
          <article class="tileItem">
            <a class="summary url" href="https://fapesq.rpp.br/editais/edital-03-2025.pdf/view">
              Edital 03/2025 - Apoio a Startups
            </a>
            <span class="description">Submissões de 12 a 31/03/2025 pelo SigFapesq</span>
            <span class="summary-view-icon">10/02/2025</span>
          </article>
          <article class="tileItem">
            <a class="summary url" href="https://fapesq.rpp.br/editais/edital-09-2025.pdf/view">
              Edital 09/2025 - Bolsas
            </a>
            <span class="description">Inscrições até 30/12/2025</span>
          </article>
          <article class="tileItem">
            <a class="summary url" href="https://fapesq.rpp.br/editais/edital-fluxo.pdf/view">
              Edital Fluxo Contínuo
            </a>
            <span class="description">Submissões em fluxo contínuo</span>
          </article>
        </body></html>
    "#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[test]
    fn test_parse_listing_strips_view_suffix() {
        let calls = parse_listing(FIXTURE, LISTING_URL);
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0].pdf_urls,
            vec!["https://fapesq.rpp.br/editais/edital-03-2025.pdf".to_string()]
        );
        assert_eq!(calls[0].titulo, "Edital 03/2025 - Apoio a Startups");
    }

    #[test]
    fn test_date_filter_admission_rules() {
        // At 2025-06-15: "de 12 a 31/03/2025" expired, "até 30/12/2025"
        // open, and the dateless row is admitted
        let calls = parse_listing(FIXTURE, LISTING_URL);
        let admitted = filter_calls(calls, true, today());

        let titles: Vec<&str> = admitted.iter().map(|c| c.titulo.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Edital 09/2025 - Bolsas", "Edital Fluxo Contínuo"]
        );
    }

    #[test]
    fn test_no_filter_returns_everything() {
        let calls = parse_listing(FIXTURE, LISTING_URL);
        assert_eq!(filter_calls(calls, false, today()).len(), 3);
    }
}
