//! Visits - a small website that counts its own page views
//!
//! - Records every trackable GET request as a visit
//! - Serves per-page and site-wide statistics through a time-bounded cache
//! - Read-only admin over the recorded visits, with a decoy login in production
//! - `vendor-pull` downloads the CDN assets the pages link to

mod assets;
mod cache;
mod config;
mod db;
mod tracking;
mod web;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::assets::PullOutcome;
use crate::cache::VisitCache;
use crate::config::Config;

/// Page visit tracking website
#[derive(Parser, Debug)]
#[command(name = "visits", version)]
struct Cli {
    /// Configuration file, optional
    #[arg(long, env = "VISITS_CONFIG", default_value = "config.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    /// Requested subcommand, `serve` when none is given
    fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// Run the web server (default)
    Serve,
    /// Download vendor static files into `files.vendor_dir`
    VendorPull {
        /// Download again even when the file already exists
        #[arg(long)]
        force: bool,
    },
    /// Print a greeting and exit
    Hello,
}

fn init_logging(config: &Config) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.subcommand() {
        Command::Hello => {
            println!("Hello, World!");
            Ok(())
        }
        Command::VendorPull { force } => vendor_pull(&load_config(&cli.config)?, force).await,
        Command::Serve => serve(load_config(&cli.config)?).await,
    }
}

fn load_config(path: &str) -> Result<Config> {
    let config = Config::load(path)?;
    init_logging(&config);
    Ok(config)
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Visits...");
    if config.debug {
        info!("Debug mode enabled, admin at /admin/");
    }

    let db = db::Database::new(&config.database).await?;
    db.run_migrations().await?;
    info!("Database initialized");

    let store = cache::store_from_config(&config.cache)?;
    let cache = VisitCache::new(store, std::sync::Arc::new(db.clone()));
    info!("Cache initialized ({}s expiry)", config.cache.timeout_secs);

    web::start_server(&config, db, cache).await
}

async fn vendor_pull(config: &Config, force: bool) -> Result<()> {
    let report = assets::vendor_pull(&config.files, force).await?;
    match report.outcome() {
        PullOutcome::Failed => anyhow::bail!("no vendor file could be downloaded"),
        PullOutcome::Complete | PullOutcome::Partial => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("visits").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_the_default_command() {
        let cli = parse(&[]);
        assert_eq!(cli.subcommand(), Command::Serve);
        assert_eq!(cli.config, "config.toml");
    }

    #[test]
    fn subcommands_and_global_config() {
        assert_eq!(parse(&["hello"]).subcommand(), Command::Hello);

        let cli = parse(&["vendor-pull", "--force", "--config", "prod.toml"]);
        assert_eq!(cli.subcommand(), Command::VendorPull { force: true });
        assert_eq!(cli.config, "prod.toml");
    }
}
