// src/services/csv_export.rs

//! CSV export adapter.
//!
//! NHIF publishes accredited-hospital lists as CSV downloads. A site may be a
//! single export or a numbered series of exports; the first line is a header.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{CsvExportConfig, Record};
use crate::services::RecordSource;
use crate::utils::http::fetch_text;
use crate::utils::page_url;

/// Adapter for registers published as CSV files.
pub struct CsvExportSource {
    site: String,
    config: CsvExportConfig,
    client: Client,
}

impl CsvExportSource {
    pub fn new(site: &str, config: CsvExportConfig, client: Client) -> Self {
        Self {
            site: site.to_string(),
            config,
            client,
        }
    }

    fn parse_records(&self, text: &str, page: u32) -> Result<Vec<Record>> {
        let mut rows = parse_rows(text, self.config.separator).into_iter();
        let Some(header) = rows.next() else {
            return Ok(Vec::new());
        };
        let columns: Vec<String> = header.iter().map(|h| self.column_name(h)).collect();

        let mut records = Vec::new();
        for (index, row) in rows.enumerate() {
            // Trailing blank lines
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            if row.len() != columns.len() {
                return Err(AppError::page_parse(
                    &self.site,
                    page,
                    format!(
                        "line {} has {} fields, header has {}",
                        index + 2,
                        row.len(),
                        columns.len()
                    ),
                ));
            }
            let record: Record = columns
                .iter()
                .zip(row)
                .filter(|(column, _)| !column.is_empty())
                .map(|(column, value)| (column.clone(), Value::String(value)))
                .collect();
            records.push(record);
        }
        Ok(records)
    }

    fn column_name(&self, header: &str) -> String {
        let name = normalize_header(header);
        self.config.rename.get(&name).cloned().unwrap_or(name)
    }
}

#[async_trait]
impl RecordSource for CsvExportSource {
    fn site(&self) -> &str {
        &self.site
    }

    async fn discover_page_count(&self) -> Result<u32> {
        if let Some(count_url) = &self.config.count_url {
            let body = fetch_text(&self.client, count_url)
                .await
                .map_err(|e| AppError::source_unavailable(&self.site, e))?;
            let count: u32 = body.trim().parse().map_err(|_| {
                AppError::source_unavailable(
                    &self.site,
                    format!("page count '{}' is not a number", body.trim()),
                )
            })?;
            if count == 0 {
                return Err(AppError::source_unavailable(&self.site, "page count is 0"));
            }
            return Ok(count);
        }
        Ok(self.config.pages.unwrap_or(1).max(1))
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Record>> {
        let url = page_url(&self.config.url_template, page);
        let text = fetch_text(&self.client, &url)
            .await
            .map_err(|e| AppError::page_fetch(&self.site, page, e))?;
        self.parse_records(&text, page)
    }
}

/// Lowercase a header and collapse everything but letters and digits to `_`.
fn normalize_header(header: &str) -> String {
    let mapped: String = header
        .trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    mapped
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Split CSV text into rows of fields.
///
/// Handles quoted fields with embedded separators, doubled quotes and
/// newlines, and both `\n` and `\r\n` line endings.
pub fn parse_rows(text: &str, separator: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            c if c == separator => row.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
