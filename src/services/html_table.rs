// src/services/html_table.rs

//! Paginated HTML register adapter.
//!
//! Registry sites render one table per page (`?currpage=N`) and a pagination
//! block whose text carries the total page count.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{HtmlTableConfig, Record, normalize_text};
use crate::services::RecordSource;
use crate::utils::http::fetch_text;
use crate::utils::page_url;

/// Adapter for registers published as paginated HTML tables.
pub struct HtmlTableSource {
    site: String,
    config: HtmlTableConfig,
    client: Client,
    row_sel: Selector,
    cell_sel: Selector,
    pagination_sel: Selector,
    page_count_re: Regex,
}

impl HtmlTableSource {
    pub fn new(site: &str, config: HtmlTableConfig, client: Client) -> Result<Self> {
        let row_sel = Self::parse_selector(&config.row_selector)?;
        let cell_sel = Self::parse_selector("td")?;
        let pagination_sel = Self::parse_selector(&config.pagination_selector)?;
        let page_count_re = Regex::new(&config.page_count_pattern).map_err(|e| {
            AppError::config(format!(
                "{site}: invalid page_count_pattern '{}': {e}",
                config.page_count_pattern
            ))
        })?;

        Ok(Self {
            site: site.to_string(),
            config,
            client,
            row_sel,
            cell_sel,
            pagination_sel,
            page_count_re,
        })
    }

    /// Extract the page count from a listing page.
    ///
    /// A page without a pagination block but with data rows is a single page.
    fn parse_page_count(&self, html: &str) -> Option<u32> {
        let document = Html::parse_document(html);
        match document.select(&self.pagination_sel).next() {
            Some(pagination) => {
                let text: String = pagination.text().collect();
                self.page_count_re
                    .captures(&text)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse().ok())
            }
            None => document
                .select(&self.row_sel)
                .any(|row| row.select(&self.cell_sel).next().is_some())
                .then_some(1),
        }
    }

    /// Parse every data row of a listing page.
    fn parse_rows(&self, html: &str, page: u32) -> Result<Vec<Record>> {
        let document = Html::parse_document(html);
        let mut records = Vec::new();

        for (index, row) in document.select(&self.row_sel).enumerate() {
            if let Some(record) = self.parse_row(&row, index, page)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn parse_row(&self, row: &ElementRef, index: usize, page: u32) -> Result<Option<Record>> {
        let cells: Vec<String> = row
            .select(&self.cell_sel)
            .map(|cell| normalize_text(&cell.text().collect::<String>()))
            .collect();

        // Header rows only carry <th>
        if cells.is_empty() {
            return Ok(None);
        }
        if cells.len() < self.config.columns.len() {
            return Err(AppError::page_parse(
                &self.site,
                page,
                format!(
                    "row {index} has {} cells, expected {}",
                    cells.len(),
                    self.config.columns.len()
                ),
            ));
        }

        let mut record = Record::new();
        for (column, value) in self.config.columns.iter().zip(cells) {
            if !column.is_empty() {
                record.insert(column.as_str(), value);
            }
        }
        for (field, value) in &self.config.extra_fields {
            record.insert(field.as_str(), value.as_str());
        }
        Ok(Some(record))
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}

#[async_trait]
impl RecordSource for HtmlTableSource {
    fn site(&self) -> &str {
        &self.site
    }

    async fn discover_page_count(&self) -> Result<u32> {
        let url = page_url(&self.config.url_template, 1);
        let html = fetch_text(&self.client, &url)
            .await
            .map_err(|e| AppError::source_unavailable(&self.site, e))?;

        match self.parse_page_count(&html) {
            Some(count) if count > 0 => Ok(count),
            _ => Err(AppError::source_unavailable(
                &self.site,
                format!("no page count found at {url}"),
            )),
        }
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Record>> {
        let url = page_url(&self.config.url_template, page);
        let html = fetch_text(&self.client, &url)
            .await
            .map_err(|e| AppError::page_fetch(&self.site, page, e))?;
        self.parse_rows(&html, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE_ONE: &str = r#"
        <html><body>
        <table class="zebra">
          <tr><th>Name</th><th>Reg No</th><th>Address</th></tr>
          <tr><td> Dr. Achieng   Otieno </td><td>A1001</td><td>P.O. Box 1, Kisumu</td></tr>
          <tr><td>Dr. Kamau Njoroge</td><td>A1002</td><td>P.O. Box 2, Nyeri</td></tr>
        </table>
        <div id="tnt_pagination">Viewing 1 to 2 of 26 records &middot; 13 pages</div>
        </body></html>
    "#;

    fn config(url_template: String) -> HtmlTableConfig {
        HtmlTableConfig {
            url_template,
            row_selector: "table.zebra tr".into(),
            pagination_selector: "div#tnt_pagination".into(),
            page_count_pattern: r"(\d+)\s+pages?".into(),
            columns: vec!["name".into(), "reg_no".into(), "".into()],
            extra_fields: BTreeMap::from([("doctor_type".into(), "local_doctor".into())]),
        }
    }

    fn source(url_template: &str) -> HtmlTableSource {
        HtmlTableSource::new("doctors", config(url_template.into()), Client::new()).unwrap()
    }

    #[test]
    fn parses_page_count_from_pagination() {
        let src = source("http://unused/?currpage={page}");
        assert_eq!(src.parse_page_count(PAGE_ONE), Some(13));
    }

    #[test]
    fn single_page_without_pagination() {
        let src = source("http://unused/?currpage={page}");
        let html = r#"<table class="zebra"><tr><td>A</td><td>B</td><td>C</td></tr></table>"#;
        assert_eq!(src.parse_page_count(html), Some(1));
        assert_eq!(src.parse_page_count("<html></html>"), None);
    }

    #[test]
    fn parses_rows_skipping_headers_and_blank_columns() {
        let src = source("http://unused/?currpage={page}");
        let records = src.parse_rows(PAGE_ONE, 1).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), Some(&json!("Dr. Achieng Otieno")));
        assert_eq!(records[0].identity("reg_no"), Some("A1001".into()));
        assert_eq!(records[1].get("doctor_type"), Some(&json!("local_doctor")));
        assert!(records[0].get("").is_none());
    }

    #[test]
    fn short_row_is_parse_error() {
        let src = source("http://unused/?currpage={page}");
        let html = r#"<table class="zebra"><tr><td>Only one</td></tr></table>"#;
        let err = src.parse_rows(html, 4).unwrap_err();
        assert!(matches!(err, AppError::PageParse { page: 4, .. }));
    }

    #[test]
    fn invalid_selector_rejected() {
        let mut cfg = config("http://unused/{page}".into());
        cfg.row_selector = "[[invalid".into();
        assert!(HtmlTableSource::new("doctors", cfg, Client::new()).is_err());
    }

    #[tokio::test]
    async fn discovers_and_fetches_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/retention/"))
            .and(query_param("currpage", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_ONE))
            .mount(&server)
            .await;

        let src = source(&format!("{}/retention/?currpage={{page}}", server.uri()));
        assert_eq!(src.discover_page_count().await.unwrap(), 13);
        assert_eq!(src.fetch_page(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let src = source(&format!("{}/retention/?currpage={{page}}", server.uri()));
        let err = src.discover_page_count().await.unwrap_err();
        assert!(matches!(err, AppError::SourceUnavailable { .. }));

        let err = src.fetch_page(2).await.unwrap_err();
        assert!(matches!(err, AppError::PageFetch { page: 2, .. }));
    }
}
