//! Site adapters.
//!
//! Every upstream implements [`RecordSource`]:
//! - Paginated HTML registers (`HtmlTableSource`)
//! - Token-authenticated JSON API (`TokenApiSource`)
//! - CSV exports (`CsvExportSource`)
//!
//! Sources perform exactly one outbound request per call and never retry;
//! retries belong to the page collector.

mod csv_export;
mod html_table;
mod token_api;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;
use crate::models::{Record, SiteConfig, SourceConfig};

pub use csv_export::{CsvExportSource, parse_rows};
pub use html_table::HtmlTableSource;
pub use token_api::TokenApiSource;

/// Fetches and parses one upstream site, page by page.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Site name used in errors and logs.
    fn site(&self) -> &str;

    /// Total number of pages (at least 1).
    ///
    /// Fails with `SourceUnavailable` if the upstream is unreachable or the
    /// count cannot be parsed.
    async fn discover_page_count(&self) -> Result<u32>;

    /// Records of a 1-based page, in upstream order.
    ///
    /// An empty vector means there is no more data.
    async fn fetch_page(&self, page: u32) -> Result<Vec<Record>>;
}

/// Build the adapter for a configured site.
pub fn build_source(site: &SiteConfig, client: &Client) -> Result<Box<dyn RecordSource>> {
    let source: Box<dyn RecordSource> = match &site.source {
        SourceConfig::HtmlTable(config) => Box::new(HtmlTableSource::new(
            &site.name,
            config.clone(),
            client.clone(),
        )?),
        SourceConfig::TokenApi(config) => Box::new(TokenApiSource::new(
            &site.name,
            config.clone(),
            client.clone(),
        )),
        SourceConfig::CsvExport(config) => Box::new(CsvExportSource::new(
            &site.name,
            config.clone(),
            client.clone(),
        )),
    };
    Ok(source)
}
