//! Utility functions and helpers.

pub mod http;
pub mod retry;

use chrono::{DateTime, Utc};

use crate::models::{PAGE_PLACEHOLDER, TIMESTAMP_PLACEHOLDER};

/// Substitute the page number into a URL template.
pub fn page_url(template: &str, page: u32) -> String {
    template.replace(PAGE_PLACEHOLDER, &page.to_string())
}

/// Substitute a compact UTC timestamp into an archive key template.
pub fn timestamped_key(template: &str, at: DateTime<Utc>) -> String {
    template.replace(
        TIMESTAMP_PLACEHOLDER,
        &at.format("%Y%m%dT%H%M%SZ").to_string(),
    )
}
