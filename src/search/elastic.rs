//! Elasticsearch backend over the REST API.
//!
//! Each namespace maps to the index `{index_prefix}-{namespace}`. Writes go
//! through `_bulk` with `refresh=wait_for` so a reconcile issued right after
//! indexing sees the new documents.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{IndexConfig, KeyedDocument};
use crate::search::{BulkOutcome, SearchIndex};

const SCROLL_KEEP_ALIVE: &str = "1m";
const SCROLL_PAGE_SIZE: usize = 1000;

/// Elasticsearch-backed search index.
pub struct ElasticIndex {
    client: Client,
    base: Url,
    prefix: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticIndex {
    pub fn new(config: &IndexConfig, client: Client) -> Result<Self> {
        let mut base = config.url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            client,
            base: Url::parse(&base)?,
            prefix: config.index_prefix.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn index_name(&self, namespace: &str) -> String {
        format!("{}-{}", self.prefix, namespace)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    /// POST an NDJSON body to `_bulk` and interpret the per-item results.
    async fn send_bulk(&self, body: String) -> Result<BulkOutcome> {
        let url = self.endpoint("_bulk?refresh=wait_for")?;
        let response: Value = self
            .authorize(self.client.post(url))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(parse_bulk_response(&response))
    }

    async fn scroll_next(&self, scroll_id: &str) -> Result<Value> {
        let url = self.endpoint("_search/scroll")?;
        let body = json!({"scroll": SCROLL_KEEP_ALIVE, "scroll_id": scroll_id});
        let response = self
            .authorize(self.client.post(url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }

    async fn clear_scroll(&self, scroll_id: &str) {
        let result = match self.endpoint("_search/scroll") {
            Ok(url) => self
                .authorize(self.client.delete(url))
                .json(&json!({"scroll_id": scroll_id}))
                .send()
                .await
                .map(|_| ())
                .map_err(AppError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            log::debug!("Failed to clear scroll context: {}", e);
        }
    }
}

/// Interpret a `_bulk` response body.
///
/// Successful statuses are 2xx; a delete answered with 404 also counts as
/// success since the document is gone either way.
pub fn parse_bulk_response(response: &Value) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for item in items {
        let Some((action, result)) = item.as_object().and_then(|o| o.iter().next()) else {
            continue;
        };
        let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);
        let ok = (200..300).contains(&status) || (action == "delete" && status == 404);

        if ok {
            outcome.succeeded += 1;
        } else {
            outcome.failed += 1;
            let id = result.get("_id").and_then(Value::as_str).unwrap_or("?");
            let reason = result
                .pointer("/error/reason")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            outcome.errors.push(format!("{action} {id}: {status} {reason}"));
        }
    }
    outcome
}

fn hit_ids(response: &Value) -> Vec<String> {
    response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.get("_id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    async fn bulk_upsert(
        &self,
        namespace: &str,
        documents: &[KeyedDocument],
    ) -> Result<BulkOutcome> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let index = self.index_name(namespace);
        let mut body = String::new();
        for (key, document) in documents {
            body.push_str(&json!({"index": {"_index": index, "_id": key}}).to_string());
            body.push('\n');
            body.push_str(&serde_json::to_string(document)?);
            body.push('\n');
        }

        let outcome = self.send_bulk(body).await?;
        log::info!(
            "Bulk upsert to {}: {} ok, {} failed",
            index,
            outcome.succeeded,
            outcome.failed
        );
        Ok(outcome)
    }

    async fn list_keys(&self, namespace: &str) -> Result<HashSet<String>> {
        let index = self.index_name(namespace);
        let url = self.endpoint(&format!("{index}/_search?scroll={SCROLL_KEEP_ALIVE}"))?;
        let query = json!({
            "size": SCROLL_PAGE_SIZE,
            "_source": false,
            "query": {"match_all": {}}
        });

        let response = self
            .authorize(self.client.post(url))
            .json(&query)
            .send()
            .await?;

        // Index not created yet
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(HashSet::new());
        }
        let mut page: Value = response.error_for_status()?.json().await?;

        let mut keys = HashSet::new();
        let mut scroll_id = None;
        loop {
            let ids = hit_ids(&page);
            if ids.is_empty() {
                break;
            }
            keys.extend(ids);

            let Some(id) = page.get("_scroll_id").and_then(Value::as_str) else {
                break;
            };
            scroll_id = Some(id.to_string());
            page = self.scroll_next(id).await?;
        }

        if let Some(id) = scroll_id {
            self.clear_scroll(&id).await;
        }
        Ok(keys)
    }

    async fn bulk_delete(&self, namespace: &str, keys: &[String]) -> Result<BulkOutcome> {
        if keys.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let index = self.index_name(namespace);
        let mut body = String::new();
        for key in keys {
            body.push_str(&json!({"delete": {"_index": index, "_id": key}}).to_string());
            body.push('\n');
        }

        let outcome = self.send_bulk(body).await?;
        log::info!(
            "Bulk delete from {}: {} ok, {} failed",
            index,
            outcome.succeeded,
            outcome.failed
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexBackend;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn index(url: &str) -> ElasticIndex {
        let config = IndexConfig {
            backend: IndexBackend::Elasticsearch,
            local_dir: String::new(),
            url: url.to_string(),
            index_prefix: "healthtools".into(),
            username: None,
            password: None,
        };
        ElasticIndex::new(&config, Client::new()).unwrap()
    }

    #[test]
    fn parses_mixed_bulk_response() {
        let response = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "A1", "status": 201}},
                {"index": {"_id": "B2", "status": 200}},
                {"index": {"_id": "C3", "status": 400,
                    "error": {"reason": "failed to parse field [name]"}}},
                {"delete": {"_id": "D4", "status": 404}}
            ]
        });

        let outcome = parse_bulk_response(&response);
        assert_eq!(outcome.succeeded, 3);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors, vec!["index C3: 400 failed to parse field [name]"]);
    }

    #[test]
    fn index_name_is_prefixed() {
        assert_eq!(index("http://localhost:9200").index_name("doctors"), "healthtools-doctors");
    }

    #[tokio::test]
    async fn bulk_upsert_sends_ndjson() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("content-type", "application/x-ndjson"))
            .and(body_string_contains(r#""_index":"healthtools-doctors""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": false,
                "items": [{"index": {"_id": "A1", "status": 201}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let es = index(&server.uri());
        let outcome = es
            .bulk_upsert("doctors", &[("A1".into(), json!({"reg_no": "A1"}))])
            .await
            .unwrap();
        assert_eq!(outcome.succeeded, 1);
    }

    #[tokio::test]
    async fn empty_requests_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let es = index(&server.uri());
        assert_eq!(es.bulk_upsert("doctors", &[]).await.unwrap(), BulkOutcome::default());
        assert_eq!(es.bulk_delete("doctors", &[]).await.unwrap(), BulkOutcome::default());
    }

    #[tokio::test]
    async fn list_keys_follows_scroll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/healthtools-doctors/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "scroll-1",
                "hits": {"hits": [{"_id": "A1"}, {"_id": "B2"}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_scroll_id": "scroll-1",
                "hits": {"hits": []}
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let keys = index(&server.uri()).list_keys("doctors").await.unwrap();
        assert_eq!(keys, HashSet::from(["A1".to_string(), "B2".to_string()]));
    }

    #[tokio::test]
    async fn missing_index_has_no_keys() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let keys = index(&server.uri()).list_keys("doctors").await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let es = index(&server.uri());
        let result = es.bulk_delete("doctors", &["A1".to_string()]).await;
        assert!(matches!(result, Err(AppError::Http(_))));
    }
}
