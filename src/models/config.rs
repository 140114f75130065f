//! Application configuration structures.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Placeholder substituted with the UTC timestamp in archive templates.
pub const TIMESTAMP_PLACEHOLDER: &str = "{ts}";

/// Placeholder substituted with the page number in source URLs.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and pagination behavior
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Search index backend
    #[serde(default)]
    pub index: IndexConfig,

    /// Archive storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Operational alerts
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Aggregate statistics archive keys
    #[serde(default)]
    pub stats: StatsConfig,

    /// Sites in run order
    #[serde(default = "defaults::sites")]
    pub sites: Vec<SiteConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Look up a site by name.
    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.name == name)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.scraper.user_agent.trim().is_empty() {
            return Err(AppError::validation("scraper.user_agent is empty"));
        }
        if self.scraper.timeout_secs == 0 {
            return Err(AppError::validation("scraper.timeout_secs must be > 0"));
        }
        if self.scraper.page_retries == 0 {
            return Err(AppError::validation("scraper.page_retries must be > 0"));
        }
        if self.scraper.max_concurrent_pages == 0 {
            return Err(AppError::validation(
                "scraper.max_concurrent_pages must be > 0",
            ));
        }
        if !self.stats.archive_template.contains(TIMESTAMP_PLACEHOLDER) {
            return Err(AppError::validation(format!(
                "stats.archive_template must contain {TIMESTAMP_PLACEHOLDER}"
            )));
        }
        if self.sites.is_empty() {
            return Err(AppError::validation("No sites defined"));
        }

        let mut earlier: HashSet<&str> = HashSet::new();
        for site in &self.sites {
            site.validate()?;
            if let Some(dep) = &site.depends_on {
                if !earlier.contains(dep.as_str()) {
                    return Err(AppError::validation(format!(
                        "site '{}' depends on '{}', which is not declared before it",
                        site.name, dep
                    )));
                }
            }
            if !earlier.insert(site.name.as_str()) {
                return Err(AppError::validation(format!(
                    "site '{}' is declared twice",
                    site.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            index: IndexConfig::default(),
            storage: StorageConfig::default(),
            notify: NotifyConfig::default(),
            stats: StatsConfig::default(),
            sites: defaults::sites(),
        }
    }
}

/// HTTP client and pagination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts per page before it is recorded as failed
    #[serde(default = "defaults::page_retries")]
    pub page_retries: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// Pages fetched concurrently within one site
    #[serde(default = "defaults::max_concurrent_pages")]
    pub max_concurrent_pages: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            page_retries: defaults::page_retries(),
            retry_delay_ms: defaults::retry_delay(),
            max_concurrent_pages: defaults::max_concurrent_pages(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// JSON files on disk, one per namespace
    #[default]
    Local,
    Elasticsearch,
}

/// Search index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    /// Directory for the local backend
    #[serde(default = "defaults::index_dir")]
    pub local_dir: String,

    /// Elasticsearch endpoint
    #[serde(default = "defaults::elasticsearch_url")]
    pub url: String,

    /// Prefix for index names (`{prefix}-{namespace}`)
    #[serde(default = "defaults::index_prefix")]
    pub index_prefix: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            local_dir: defaults::index_dir(),
            url: defaults::elasticsearch_url(),
            index_prefix: defaults::index_prefix(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

/// Archive storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory for the local backend
    #[serde(default = "defaults::storage_dir")]
    pub local_dir: String,

    #[serde(default = "defaults::bucket")]
    pub bucket: String,

    /// Key prefix inside the bucket
    #[serde(default)]
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            local_dir: defaults::storage_dir(),
            bucket: defaults::bucket(),
            prefix: String::new(),
        }
    }
}

/// Alerting settings. Without a webhook URL alerts only go to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub slack_webhook_url: Option<String>,

    #[serde(default = "defaults::notify_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            slack_webhook_url: None,
            timeout_secs: defaults::notify_timeout(),
        }
    }
}

/// Where the aggregate statistics are archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "defaults::stats_latest_key")]
    pub latest_key: String,

    #[serde(default = "defaults::stats_archive_template")]
    pub archive_template: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            latest_key: defaults::stats_latest_key(),
            archive_template: defaults::stats_archive_template(),
        }
    }
}

/// One upstream site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site name, also the default index namespace
    pub name: String,

    /// Field holding the record's identity key
    pub identity_field: String,

    /// Site that must finish before this one runs
    #[serde(default)]
    pub depends_on: Option<String>,

    /// Index namespace override
    #[serde(default)]
    pub namespace: Option<String>,

    /// Archive key overwritten on every run
    pub latest_key: String,

    /// Historical archive key; `{ts}` is replaced by the UTC timestamp
    pub archive_template: String,

    pub source: SourceConfig,
}

impl SiteConfig {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(&self.name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("site name is empty"));
        }
        if self.identity_field.trim().is_empty() {
            return Err(AppError::validation(format!(
                "site '{}': identity_field is empty",
                self.name
            )));
        }
        if !self.archive_template.contains(TIMESTAMP_PLACEHOLDER) {
            return Err(AppError::validation(format!(
                "site '{}': archive_template must contain {TIMESTAMP_PLACEHOLDER}",
                self.name
            )));
        }
        if self.depends_on.as_deref() == Some(self.name.as_str()) {
            return Err(AppError::validation(format!(
                "site '{}' depends on itself",
                self.name
            )));
        }
        self.source.validate(&self.name)
    }
}

/// Upstream style of a site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    HtmlTable(HtmlTableConfig),
    TokenApi(TokenApiConfig),
    CsvExport(CsvExportConfig),
}

impl SourceConfig {
    fn validate(&self, site: &str) -> Result<()> {
        let url_template = match self {
            Self::HtmlTable(c) => &c.url_template,
            Self::TokenApi(c) => &c.url_template,
            Self::CsvExport(c) => &c.url_template,
        };
        if url_template.trim().is_empty() {
            return Err(AppError::validation(format!("site '{site}': url_template is empty")));
        }
        match self {
            Self::HtmlTable(c) if c.columns.iter().all(|col| col.is_empty()) => {
                return Err(AppError::validation(format!("site '{site}': no columns defined")));
            }
            Self::CsvExport(c) => {
                let paged = c.url_template.contains(PAGE_PLACEHOLDER);
                let multi_page = c.count_url.is_some() || c.pages.is_some_and(|n| n > 1);
                if paged && !multi_page {
                    return Err(AppError::validation(format!(
                        "site '{site}': url_template has {PAGE_PLACEHOLDER} but neither \
                         count_url nor pages is set"
                    )));
                }
                if !paged && multi_page {
                    return Err(AppError::validation(format!(
                        "site '{site}': multiple pages but url_template has no {PAGE_PLACEHOLDER}"
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Paginated HTML table (registry "retention" listings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlTableConfig {
    /// Page URL; `{page}` is replaced by the 1-based page number
    pub url_template: String,

    /// CSS selector for data rows
    #[serde(default = "defaults::row_selector")]
    pub row_selector: String,

    /// CSS selector for the element holding the page count text
    #[serde(default = "defaults::pagination_selector")]
    pub pagination_selector: String,

    /// Regex whose first capture group is the page count
    #[serde(default = "defaults::page_count_pattern")]
    pub page_count_pattern: String,

    /// Field names in cell order; empty names skip the cell
    pub columns: Vec<String>,

    /// Constant fields added to every record
    #[serde(default)]
    pub extra_fields: BTreeMap<String, String>,
}

/// Token-authenticated JSON API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenApiConfig {
    /// OAuth2 password-grant token endpoint
    pub token_url: String,

    /// Data URL; `{page}` is replaced by the page number
    pub url_template: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// Response field holding the record array
    #[serde(default = "defaults::results_field")]
    pub results_field: String,

    /// Response field holding the total page count
    #[serde(default = "defaults::page_count_field")]
    pub page_count_field: String,

    /// Output field -> response field; empty keeps every scalar field
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// CSV export endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvExportConfig {
    /// Export URL; `{page}` is replaced by the page number if present
    pub url_template: String,

    /// Endpoint returning the page count as plain text
    #[serde(default)]
    pub count_url: Option<String>,

    /// Fixed page count when there is no count endpoint (default 1)
    #[serde(default)]
    pub pages: Option<u32>,

    #[serde(default = "defaults::separator")]
    pub separator: char,

    /// Normalized header name -> output field name
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
}

mod defaults {
    use std::collections::BTreeMap;

    use super::{
        CsvExportConfig, HtmlTableConfig, SiteConfig, SourceConfig, TokenApiConfig,
    };

    // Scraper defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; healthsync/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn page_retries() -> u32 {
        5
    }
    pub fn retry_delay() -> u64 {
        1000
    }
    pub fn max_concurrent_pages() -> usize {
        1
    }

    // Backend defaults
    pub fn index_dir() -> String {
        "storage/index".into()
    }
    pub fn elasticsearch_url() -> String {
        "http://localhost:9200".into()
    }
    pub fn index_prefix() -> String {
        "healthtools".into()
    }
    pub fn storage_dir() -> String {
        "storage/archive".into()
    }
    pub fn bucket() -> String {
        "healthtools".into()
    }
    pub fn notify_timeout() -> u64 {
        10
    }
    pub fn stats_latest_key() -> String {
        "stats.json".into()
    }
    pub fn stats_archive_template() -> String {
        "stats/stats-{ts}.json".into()
    }

    // Source defaults
    pub fn row_selector() -> String {
        "table.zebra tr".into()
    }
    pub fn pagination_selector() -> String {
        "div#tnt_pagination".into()
    }
    pub fn page_count_pattern() -> String {
        r"(\d+)\s+pages?".into()
    }
    pub fn results_field() -> String {
        "results".into()
    }
    pub fn page_count_field() -> String {
        "total_pages".into()
    }
    pub fn separator() -> char {
        ','
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn html_site(
        name: &str,
        url_template: &str,
        cols: &[&str],
        doctor_type: Option<&str>,
    ) -> SiteConfig {
        let mut extra_fields = BTreeMap::new();
        if let Some(t) = doctor_type {
            extra_fields.insert("doctor_type".to_string(), t.to_string());
        }
        SiteConfig {
            name: name.into(),
            identity_field: "reg_no".into(),
            depends_on: None,
            namespace: None,
            latest_key: format!("data/{name}.json"),
            archive_template: format!("archive/{name}-{{ts}}.json"),
            source: SourceConfig::HtmlTable(HtmlTableConfig {
                url_template: url_template.into(),
                row_selector: row_selector(),
                pagination_selector: pagination_selector(),
                page_count_pattern: page_count_pattern(),
                columns: columns(cols),
                extra_fields,
            }),
        }
    }

    fn nhif_site(name: &str, url_template: &str) -> SiteConfig {
        SiteConfig {
            name: name.into(),
            identity_field: "code".into(),
            depends_on: None,
            namespace: None,
            latest_key: format!("data/{name}.json"),
            archive_template: format!("archive/{name}-{{ts}}.json"),
            source: SourceConfig::CsvExport(CsvExportConfig {
                url_template: url_template.into(),
                count_url: None,
                pages: None,
                separator: separator(),
                rename: BTreeMap::from([
                    ("hospital_code".to_string(), "code".to_string()),
                    ("hospital_name".to_string(), "name".to_string()),
                ]),
            }),
        }
    }

    const MEDICAL_BOARD: &str = "http://medicalboard.co.ke/online-services";
    const KMHFL_API: &str = "http://api.kmhfl.health.go.ke";
    const FACILITY_QUERY: &str = "?page={page}&page_size=500";

    pub fn sites() -> Vec<SiteConfig> {
        let mut foreign_doctors = html_site(
            "foreign_doctors",
            &format!("{MEDICAL_BOARD}/foreign-doctors-license-register/?currpage={{page}}"),
            &[
                "name",
                "reg_no",
                "postal_address",
                "qualifications",
                "facility",
                "practice_type",
            ],
            Some("foreign_doctor"),
        );
        foreign_doctors.depends_on = Some("doctors".into());

        let health_facilities = SiteConfig {
            name: "health_facilities".into(),
            identity_field: "code".into(),
            depends_on: None,
            namespace: None,
            latest_key: "data/health_facilities.json".into(),
            archive_template: "archive/health_facilities-{ts}.json".into(),
            source: SourceConfig::TokenApi(TokenApiConfig {
                token_url: format!("{KMHFL_API}/o/token/"),
                url_template: format!("{KMHFL_API}/api/facilities/material/{FACILITY_QUERY}"),
                username: String::new(),
                password: String::new(),
                client_id: String::new(),
                client_secret: String::new(),
                results_field: results_field(),
                page_count_field: page_count_field(),
                fields: BTreeMap::new(),
            }),
        };

        vec![
            html_site(
                "doctors",
                &format!("{MEDICAL_BOARD}/retention/?currpage={{page}}"),
                &[
                    "name",
                    "reg_date",
                    "reg_no",
                    "postal_address",
                    "qualifications",
                    "speciality",
                    "sub_speciality",
                ],
                Some("local_doctor"),
            ),
            foreign_doctors,
            html_site(
                "clinical_officers",
                "http://clinicalofficerscouncil.org/online-services/retention/?currpage={page}",
                &["name", "reg_date", "reg_no", "address", "qualifications"],
                None,
            ),
            health_facilities,
            nhif_site(
                "nhif_inpatient",
                "http://www.nhif.or.ke/healthinsurance/inpatientServices/export",
            ),
            nhif_site(
                "nhif_outpatient",
                "http://www.nhif.or.ke/healthinsurance/outpatientO1Services/export",
            ),
            nhif_site(
                "nhif_outpatient_cs",
                "http://www.nhif.or.ke/healthinsurance/outpatientO2Services/export",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn default_sites_run_doctors_before_foreign_doctors() {
        let config = Config::default();
        let names: Vec<&str> = config.sites.iter().map(|s| s.name.as_str()).collect();
        let doctors = names.iter().position(|n| *n == "doctors").unwrap();
        let foreign = names.iter().position(|n| *n == "foreign_doctors").unwrap();
        assert!(doctors < foreign);
        assert_eq!(
            config.site("foreign_doctors").unwrap().depends_on.as_deref(),
            Some("doctors")
        );
        assert_eq!(names.len(), 7);
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.scraper.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_retries() {
        let mut config = Config::default();
        config.scraper.page_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_forward_dependency() {
        let mut config = Config::default();
        config.sites[0].depends_on = Some("foreign_doctors".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_site() {
        let mut config = Config::default();
        let dup = config.sites[0].clone();
        config.sites.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_template_without_timestamp() {
        let mut config = Config::default();
        config.sites[2].archive_template = "archive/clinical_officers.json".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_csv_sites_fetch_a_single_export() {
        let config = Config::default();
        for name in ["nhif_inpatient", "nhif_outpatient", "nhif_outpatient_cs"] {
            let SourceConfig::CsvExport(csv) = &config.site(name).unwrap().source else {
                panic!("{name} is not a CSV export");
            };
            assert!(!csv.url_template.contains(PAGE_PLACEHOLDER));
            assert!(csv.count_url.is_none() && csv.pages.is_none());
        }
    }

    #[test]
    fn validate_rejects_paged_csv_without_page_count() {
        let mut site = Config::default().site("nhif_inpatient").cloned().unwrap();
        let SourceConfig::CsvExport(csv) = &mut site.source else {
            panic!("nhif_inpatient is not a CSV export");
        };
        csv.url_template = "http://example.test/export?page={page}".into();
        assert!(site.validate().is_err());

        let SourceConfig::CsvExport(csv) = &mut site.source else {
            unreachable!()
        };
        csv.pages = Some(3);
        assert!(site.validate().is_ok());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
            [scraper]
            page_retries = 3

            [index]
            backend = "elasticsearch"
            url = "http://es:9200"

            [[sites]]
            name = "doctors"
            identity_field = "reg_no"
            latest_key = "data/doctors.json"
            archive_template = "archive/doctors-{ts}.json"

            [sites.source]
            kind = "html_table"
            url_template = "http://example.test/?currpage={page}"
            columns = ["name", "reg_no"]
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.scraper.page_retries, 3);
        assert_eq!(config.scraper.retry_delay_ms, 1000);
        assert_eq!(config.index.backend, IndexBackend::Elasticsearch);
        assert_eq!(config.sites.len(), 1);
        match &config.sites[0].source {
            SourceConfig::HtmlTable(c) => {
                assert_eq!(c.row_selector, "table.zebra tr");
                assert_eq!(c.columns, vec!["name", "reg_no"]);
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert!(config.validate().is_ok());
    }
}
