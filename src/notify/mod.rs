//! Failure notifications.
//!
//! Notification is fire-and-forget: a failing channel is logged and never
//! affects the outcome of a run.

pub mod slack;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::NotifyConfig;

pub use slack::SlackNotifier;

/// A channel that receives human-readable alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Notifier that only writes to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        log::warn!("{}", message);
    }
}

/// Alert text for a site failure: `[ doctors ] SourceUnavailable: ...`.
pub fn format_alert(site: &str, error: &AppError) -> String {
    format!("[ {} ] {}: {}", site, error.class(), error)
}

/// Build the configured notifier. Without a webhook URL alerts are only logged.
pub fn from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>> {
    match &config.slack_webhook_url {
        Some(url) if !url.trim().is_empty() => {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?;
            Ok(Arc::new(SlackNotifier::new(url.trim(), client)))
        }
        _ => Ok(Arc::new(LogNotifier)),
    }
}
