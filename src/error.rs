// src/error.rs

//! Unified error handling for the sync pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Page count could not be discovered; the site's run cannot proceed.
    #[error("Source unavailable for {site}: {message}")]
    SourceUnavailable { site: String, message: String },

    /// Network or HTTP status failure while fetching one page.
    #[error("Failed to fetch page {page} of {site}: {message}")]
    PageFetch {
        site: String,
        page: u32,
        message: String,
    },

    /// A fetched page could not be parsed into records.
    #[error("Failed to parse page {page} of {site}: {message}")]
    PageParse {
        site: String,
        page: u32,
        message: String,
    },

    /// The search backend rejected a bulk submission.
    #[error("Index unavailable for {namespace}: {message}")]
    IndexUnavailable { namespace: String, message: String },

    /// The storage backend rejected an archive write.
    #[error("Archive write to {key} failed: {message}")]
    ArchiveUnavailable { key: String, message: String },

    /// Two records of one run share an identity key.
    #[error("Duplicate identity keys in {site}: {}", keys.join(", "))]
    DuplicateIdentity { site: String, keys: Vec<String> },

    /// AWS S3 error
    #[error("S3 error: {0}")]
    S3(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a source-unavailable error.
    pub fn source_unavailable(site: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SourceUnavailable {
            site: site.into(),
            message: message.to_string(),
        }
    }

    /// Create a page fetch error.
    pub fn page_fetch(site: impl Into<String>, page: u32, message: impl fmt::Display) -> Self {
        Self::PageFetch {
            site: site.into(),
            page,
            message: message.to_string(),
        }
    }

    /// Create a page parse error.
    pub fn page_parse(site: impl Into<String>, page: u32, message: impl fmt::Display) -> Self {
        Self::PageParse {
            site: site.into(),
            page,
            message: message.to_string(),
        }
    }

    /// Create an index-unavailable error.
    pub fn index_unavailable(namespace: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::IndexUnavailable {
            namespace: namespace.into(),
            message: message.to_string(),
        }
    }

    /// Create an archive-unavailable error.
    pub fn archive_unavailable(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::ArchiveUnavailable {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Short class name used in notifications and stat logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "SourceUnavailable",
            Self::PageFetch { .. } => "PageFetchError",
            Self::PageParse { .. } => "PageParseError",
            Self::IndexUnavailable { .. } => "IndexUnavailable",
            Self::ArchiveUnavailable { .. } => "ArchiveUnavailable",
            Self::DuplicateIdentity { .. } => "DuplicateIdentity",
            Self::S3(_) => "S3Error",
            Self::Io(_) => "IoError",
            Self::Http(_) => "HttpError",
            Self::Json(_) => "JsonError",
            Self::Toml(_) => "TomlError",
            Self::Url(_) => "UrlError",
            Self::Selector { .. } => "SelectorError",
            Self::Config(_) => "ConfigError",
            Self::Validation(_) => "ValidationError",
        }
    }
}
