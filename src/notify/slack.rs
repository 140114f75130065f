//! Slack incoming-webhook channel.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::notify::Notifier;

#[derive(Debug, Serialize)]
struct SlackPayload<'a> {
    text: &'a str,
}

/// Posts alerts to a Slack incoming webhook.
pub struct SlackNotifier {
    url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(url: impl Into<String>, client: Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, message: &str) {
        let result = self
            .client
            .post(&self.url)
            .json(&SlackPayload { text: message })
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => log::debug!("Slack notification sent"),
            Err(e) => log::warn!("Slack notification failed: {} ({})", e, message),
        }
    }
}
