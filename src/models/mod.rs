// src/models/mod.rs

//! Domain models for the sync pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod record;
mod stats;

// Re-export all public types
pub use config::{
    Config, CsvExportConfig, HtmlTableConfig, IndexBackend, IndexConfig, NotifyConfig,
    PAGE_PLACEHOLDER, ScraperConfig, SiteConfig, SourceConfig, StatsConfig, StorageBackend,
    StorageConfig, TIMESTAMP_PLACEHOLDER, TokenApiConfig,
};
pub use record::{KeyedDocument, PageResult, Record, RunResult, normalize_text};
pub use stats::{FailedPage, RunStatus, ScrapingStatistics, StatLog, format_duration};
