// src/services/token_api.rs

//! Token-authenticated JSON API adapter.
//!
//! The facilities registry issues OAuth2 password-grant tokens. The token is
//! fetched once and cached; a `401` drops it so the next attempt refreshes.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{Record, TokenApiConfig};
use crate::services::RecordSource;
use crate::utils::page_url;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Adapter for paginated JSON APIs behind a bearer token.
pub struct TokenApiSource {
    site: String,
    config: TokenApiConfig,
    client: Client,
    token: Mutex<Option<String>>,
}

impl TokenApiSource {
    pub fn new(site: &str, config: TokenApiConfig, client: Client) -> Self {
        Self {
            site: site.to_string(),
            config,
            client,
            token: Mutex::new(None),
        }
    }

    /// Return the cached bearer token, requesting a new one if needed.
    pub async fn get_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let params = [
            ("grant_type", "password"),
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response: TokenResponse = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        log::debug!("{}: obtained access token", self.site);
        *cached = Some(response.access_token.clone());
        Ok(response.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// GET one page of the API as JSON. Errors are mapped by the caller.
    async fn get_json(&self, page: u32) -> std::result::Result<Value, PageError> {
        let token = self.get_token().await.map_err(PageError::Fetch)?;
        let url = page_url(&self.config.url_template, page);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PageError::Fetch(e.into()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
            return Err(PageError::Fetch(AppError::validation(
                "401 Unauthorized, token dropped",
            )));
        }

        let body = response
            .error_for_status()
            .map_err(|e| PageError::Fetch(e.into()))?
            .text()
            .await
            .map_err(|e| PageError::Fetch(e.into()))?;

        serde_json::from_str(&body).map_err(|e| PageError::Parse(e.into()))
    }

    /// Total pages from the response, falling back to `count / page length`.
    fn page_count(&self, body: &Value) -> Option<u32> {
        if let Some(n) = body.get(&self.config.page_count_field).and_then(Value::as_u64) {
            return u32::try_from(n).ok();
        }
        let count = body.get("count").and_then(Value::as_u64)?;
        let per_page = body
            .get(&self.config.results_field)
            .and_then(Value::as_array)
            .map(|a| a.len() as u64)
            .filter(|len| *len > 0)?;
        u32::try_from(count.div_ceil(per_page)).ok()
    }

    fn records(&self, body: &Value, page: u32) -> Result<Vec<Record>> {
        let results = body
            .get(&self.config.results_field)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AppError::page_parse(
                    &self.site,
                    page,
                    format!("missing '{}' array", self.config.results_field),
                )
            })?;

        results
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let object = item.as_object().ok_or_else(|| {
                    AppError::page_parse(&self.site, page, format!("result {i} is not an object"))
                })?;
                Ok(self.to_record(object))
            })
            .collect()
    }

    fn to_record(&self, object: &Map<String, Value>) -> Record {
        if self.config.fields.is_empty() {
            return object
                .iter()
                .filter(|(_, v)| is_scalar(v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
        self.config
            .fields
            .iter()
            .map(|(to, from)| {
                let value = object.get(from).filter(|v| is_scalar(v)).cloned();
                (to.clone(), value.unwrap_or(Value::Null))
            })
            .collect()
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

enum PageError {
    Fetch(AppError),
    Parse(AppError),
}

#[async_trait]
impl RecordSource for TokenApiSource {
    fn site(&self) -> &str {
        &self.site
    }

    async fn discover_page_count(&self) -> Result<u32> {
        let body = self.get_json(1).await.map_err(|e| match e {
            PageError::Fetch(e) | PageError::Parse(e) => {
                AppError::source_unavailable(&self.site, e)
            }
        })?;

        match self.page_count(&body) {
            Some(count) if count > 0 => Ok(count),
            _ => Err(AppError::source_unavailable(
                &self.site,
                format!("response has no '{}'", self.config.page_count_field),
            )),
        }
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Record>> {
        let body = self.get_json(page).await.map_err(|e| match e {
            PageError::Fetch(e) => AppError::page_fetch(&self.site, page, e),
            PageError::Parse(e) => AppError::page_parse(&self.site, page, e),
        })?;
        self.records(&body, page)
    }
}
