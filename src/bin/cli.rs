//! healthsync CLI
//!
//! Local execution entry point. For AWS Lambda, use `healthsync-lambda`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use healthsync::{
    config::{apply_env, load_config},
    error::Result,
    models::{Config, RunStatus, ScrapingStatistics, SourceConfig, StatLog},
    pipeline::RunCoordinator,
    storage,
};

/// healthsync - health registry to search index sync
#[derive(Parser, Debug)]
#[command(
    name = "healthsync",
    version,
    about = "Scrapes health registries into a search index"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "healthsync.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every configured site and archive the statistics
    Run,

    /// Run a single site, ignoring its dependency
    Scrape {
        /// Site name as configured
        site: String,
    },

    /// Validate the configuration file
    Validate,

    /// List configured sites in run order
    Sites,

    /// Show the latest archived statistics
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_site(log: &StatLog) {
    let marker = match log.status {
        RunStatus::Done => "✓",
        RunStatus::Skipped => "-",
        RunStatus::Failed | RunStatus::Running => "✗",
    };
    println!(
        "{} {:<20} {:>7} records  {:>3} failed pages  {:.1}s",
        marker,
        log.site,
        log.records_found,
        log.failed_pages.len(),
        log.elapsed_secs
    );
    if let Some(error) = &log.last_error {
        println!("    {}", error);
    }
    for warning in &log.warnings {
        println!("    warning: {}", warning);
    }
}

fn print_statistics(statistics: &ScrapingStatistics) {
    for log in statistics.sites.values() {
        print_site(log);
    }
    println!(
        "Total time: {} (finished {} UTC)",
        statistics.total_time, statistics.finished_at
    );
}

fn print_sites(config: &Config) {
    for site in &config.sites {
        let kind = match &site.source {
            SourceConfig::HtmlTable(_) => "html_table",
            SourceConfig::TokenApi(_) => "token_api",
            SourceConfig::CsvExport(_) => "csv_export",
        };
        let dependency = site
            .depends_on
            .as_deref()
            .map(|d| format!(" (after {d})"))
            .unwrap_or_default();
        println!(
            "{:<20} {:<11} key={:<10} namespace={}{}",
            site.name,
            kind,
            site.identity_field,
            site.namespace(),
            dependency
        );
    }
}

async fn show_info(config: &Config) -> Result<()> {
    let storage = storage::open(&config.storage).await?;
    let key = &config.stats.latest_key;

    match storage.get(key).await? {
        Some(bytes) => {
            let statistics: ScrapingStatistics = serde_json::from_slice(&bytes)?;
            log::info!("Latest statistics: {}", storage.location(key));
            print_statistics(&statistics);
        }
        None => log::info!("No statistics archived yet at {}", storage.location(key)),
    }
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(&cli.config)?;
    apply_env(&mut config);

    match cli.command {
        Command::Run => {
            let coordinator = RunCoordinator::from_config(&config).await?;
            let statistics = coordinator.run().await;
            print_statistics(&statistics);

            if statistics.any_failed() {
                log::error!("Failed sites: {}", statistics.failed_sites().join(", "));
                return Ok(ExitCode::FAILURE);
            }
        }

        Command::Scrape { site } => {
            let coordinator = RunCoordinator::from_config(&config).await?;
            let log = coordinator.run_site(&site).await?;
            print_site(&log);

            if log.status == RunStatus::Failed {
                return Ok(ExitCode::FAILURE);
            }
        }

        Command::Validate => {
            log::info!("Validating {}...", cli.config.display());
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK ({} sites)", config.sites.len());
        }

        Command::Sites => print_sites(&config),

        Command::Info => show_info(&config).await?,
    }

    Ok(ExitCode::SUCCESS)
}
