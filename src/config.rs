// src/config.rs

//! Configuration loading for the entry points.
//!
//! Files hold endpoints and tuning; secrets come from the environment and are
//! applied on top with [`apply_env`].

use std::path::Path;

use crate::error::Result;
use crate::models::{Config, SourceConfig};

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file is missing or malformed.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    Config::load(path).or_else(|e| {
        log::warn!("Failed to load config from {}: {}", path.display(), e);
        log::warn!("Using default configuration.");
        Ok(Config::default())
    })
}

/// Fill secrets and deployment settings from environment variables.
pub fn apply_env(config: &mut Config) {
    apply_vars(config, |name| std::env::var(name).ok());
}

fn apply_vars(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(url) = var("HEALTHSYNC_SLACK_URL") {
        config.notify.slack_webhook_url = Some(url);
    }
    if let Some(bucket) = var("S3_BUCKET") {
        config.storage.bucket = bucket;
    }
    if let Some(prefix) = var("S3_PREFIX") {
        config.storage.prefix = prefix;
    }

    let username = var("HEALTHSYNC_API_USERNAME");
    let password = var("HEALTHSYNC_API_PASSWORD");
    let client_id = var("HEALTHSYNC_API_CLIENT_ID");
    let client_secret = var("HEALTHSYNC_API_CLIENT_SECRET");

    for site in &mut config.sites {
        let SourceConfig::TokenApi(api) = &mut site.source else {
            continue;
        };
        if let Some(v) = &username {
            api.username = v.clone();
        }
        if let Some(v) = &password {
            api.password = v.clone();
        }
        if let Some(v) = &client_id {
            api.client_id = v.clone();
        }
        if let Some(v) = &client_secret {
            api.client_secret = v.clone();
        }
    }
}

#[cfg(feature = "s3")]
pub use self::s3_loader::LambdaConfigLoader;

#[cfg(feature = "s3")]
mod s3_loader {
    use crate::error::{AppError, Result};
    use crate::models::Config;
    use crate::storage::{ObjectStorage, S3Storage};

    /// Config loader for the Lambda environment.
    pub struct LambdaConfigLoader {
        storage: S3Storage,
        key: String,
    }

    impl LambdaConfigLoader {
        pub fn new(storage: S3Storage, key: &str) -> Self {
            Self {
                storage,
                key: key.to_string(),
            }
        }

        /// Read the config object, or defaults if it does not exist.
        pub async fn load_config(&self) -> Result<Config> {
            log::info!("Loading config from {}", self.storage.location(&self.key));
            let Some(bytes) = self.storage.get(&self.key).await? else {
                log::info!("No config object found, using defaults");
                return Ok(Config::default());
            };

            let text = String::from_utf8(bytes).map_err(|e| {
                AppError::config(format!("Config file {} is not valid UTF-8: {}", self.key, e))
            })?;
            Config::from_toml(&text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_fills_token_credentials() {
        let vars = HashMap::from([
            ("HEALTHSYNC_API_USERNAME", "ops@example.org"),
            ("HEALTHSYNC_API_CLIENT_SECRET", "s3cr3t"),
            ("HEALTHSYNC_SLACK_URL", "https://hooks.slack.test/T1"),
            ("S3_PREFIX", "   "),
        ]);
        let mut config = Config::default();
        apply_vars(&mut config, |name| vars.get(name).map(|v| v.to_string()));

        let SourceConfig::TokenApi(api) = &config.site("health_facilities").unwrap().source else {
            panic!("health_facilities is a token api site");
        };
        assert_eq!(api.username, "ops@example.org");
        assert_eq!(api.client_secret, "s3cr3t");
        assert_eq!(
            config.notify.slack_webhook_url.as_deref(),
            Some("https://hooks.slack.test/T1")
        );
        assert_eq!(config.storage.prefix, Config::default().storage.prefix);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/healthsync.toml")).unwrap();
        assert_eq!(config.sites.len(), Config::default().sites.len());
    }

    #[test]
    fn malformed_file_uses_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[scraper\nbroken").unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.scraper.page_retries, 5);
    }
}
