//! Normalized records and per-run result sets.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// A `(identity key, document)` pair as submitted to the search index.
pub type KeyedDocument = (String, Value);

/// One scraped entity (a doctor, a facility, ...) as a flat field map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Insert a field. String values are whitespace-normalized.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let value = match value.into() {
            Value::String(s) => Value::String(normalize_text(&s)),
            other => other,
        };
        self.0.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Identity key for reconciliation.
    ///
    /// Numbers are rendered as strings so keys compare uniformly; empty
    /// strings, nulls, and nested values do not count as a key.
    pub fn identity(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (field, value) in iter {
            record.insert(field, value);
        }
        record
    }
}

/// Records fetched from a single page.
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    /// 1-based page index
    pub page: u32,
    /// Total page count discovered before collection started
    pub page_count: u32,
    pub records: Vec<Record>,
}

/// Every record of one site for one run, in upstream page order.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub records: Vec<Record>,
}

impl RunResult {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Identity keys of all records.
    pub fn keys(&self, identity_field: &str) -> HashSet<String> {
        self.records
            .iter()
            .filter_map(|r| r.identity(identity_field))
            .collect()
    }

    /// Convert into index documents, enforcing key presence and uniqueness.
    ///
    /// Duplicated keys are reported together in one `DuplicateIdentity` error.
    pub fn into_documents(self, site: &str, identity_field: &str) -> Result<Vec<KeyedDocument>> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut documents = Vec::with_capacity(self.records.len());

        for (position, record) in self.records.into_iter().enumerate() {
            let key = record.identity(identity_field).ok_or_else(|| {
                AppError::validation(format!(
                    "{site}: record #{position} has no '{identity_field}'"
                ))
            })?;
            *seen.entry(key.clone()).or_default() += 1;
            documents.push((key, record.into_value()));
        }

        let mut duplicates: Vec<String> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(key, _)| key)
            .collect();

        if !duplicates.is_empty() {
            duplicates.sort();
            return Err(AppError::DuplicateIdentity {
                site: site.to_string(),
                keys: duplicates,
            });
        }

        Ok(documents)
    }
}

/// Collapse runs of whitespace and trim.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
