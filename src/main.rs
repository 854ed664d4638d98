use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use statisticars::{
    database::Database,
    extract::{DataExtractor, EntityCache},
    proxy::{default_providers, Anonymity, CheckerConfig, PoolConfig, ProxyChecker, ProxyPool},
    scrape::{ArtifactStore, FetchClient, FetchConfig, ScraperConfig, WebScraper},
    site::{SiteApi, SITE_NAME},
    Config,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// A classified-ad harvester for vehicle listings with rotating proxy support
#[derive(Parser)]
#[command(name = "statisticars")]
#[command(about = "A classified-ad harvester for vehicle listings with rotating proxy support")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file path
    #[arg(short, long, default_value = "statisticars.db")]
    database: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the paginated crawl and load newly-seen records
    Scrape {
        /// Soft wall-clock budget in seconds, checked between pages
        #[arg(long)]
        execution_time: Option<u64>,
        /// First search page
        #[arg(long, default_value = "0")]
        start_page: u64,
        /// Last search page, inclusive
        #[arg(long)]
        end_page: Option<u64>,
        /// Maximum concurrent detail workers
        #[arg(long, default_value = "10")]
        max_workers: usize,
        /// Admit filtered proxy candidates without probing them
        #[arg(long)]
        skip_proxy_check: bool,
        /// Root directory for raw response artifacts
        #[arg(short, long, default_value = "outputs")]
        outputs: PathBuf,
        /// Keep only these proxy country codes (can specify multiple)
        #[arg(long)]
        country: Vec<String>,
        /// Keep only these anonymity levels (elite, anonymous, transparent)
        #[arg(long, default_values_t = ["elite".to_string(), "anonymous".to_string()])]
        anonymity: Vec<String>,
        /// Cap the proxy candidate set before validation
        #[arg(long)]
        max_proxies: Option<usize>,
        /// Timeout in seconds for marketplace requests
        #[arg(long, default_value = "20")]
        timeout: u64,
    },
    /// Re-run extraction over an existing artifact directory
    Extract {
        /// Run directory containing page_N.json artifacts
        dir: PathBuf,
    },
    /// Discover, filter and validate proxies, then print the live pool
    Proxies {
        /// Keep only these proxy country codes (can specify multiple)
        #[arg(long)]
        country: Vec<String>,
        /// Keep only these anonymity levels (elite, anonymous, transparent)
        #[arg(long, default_values_t = ["elite".to_string(), "anonymous".to_string()])]
        anonymity: Vec<String>,
        /// Keep only HTTPS-capable proxies
        #[arg(long)]
        https_only: bool,
        /// Cap the candidate set before validation
        #[arg(long)]
        max_size: Option<usize>,
        /// Probe timeout in seconds
        #[arg(long, default_value = "3")]
        timeout: u64,
        /// Skip the availability probe
        #[arg(long)]
        no_check: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape {
            execution_time,
            start_page,
            end_page,
            max_workers,
            skip_proxy_check,
            outputs,
            country,
            anonymity,
            max_proxies,
            timeout,
        } => {
            let config = Config {
                database_url: cli.database,
                outputs_dir: outputs,
                ..Config::default()
            };

            let db = Database::connect(&config.database_url).await?;
            let cache = EntityCache::load(&db).await?;
            println!(
                "Cache loaded: {} announcements, {} vehicles, {} sellers",
                cache.announcement_count(),
                cache.vehicle_count(),
                cache.seller_count()
            );

            let mut pool_config = PoolConfig::new()
                .with_anonymity(parse_anonymity(&anonymity)?)
                .with_validation(!skip_proxy_check);
            if !country.is_empty() {
                pool_config = pool_config.with_country_codes(country);
            }
            if let Some(max_size) = max_proxies {
                pool_config = pool_config.with_max_size(max_size);
            }
            let pool = Arc::new(ProxyPool::new(
                default_providers(),
                ProxyChecker::new(),
                pool_config,
            )?);

            let client = FetchClient::new(
                Arc::clone(&pool),
                FetchConfig::new().with_timeout(Duration::from_secs(timeout)),
            );
            let artifacts = ArtifactStore::create(&config.outputs_dir);
            let extractor = DataExtractor::new(db, cache, SITE_NAME, &config.scraped_user);

            let mut scraper_config = ScraperConfig::new()
                .with_start_page(start_page)
                .with_max_workers(max_workers);
            if let Some(secs) = execution_time {
                scraper_config = scraper_config.with_execution_time(Duration::from_secs(secs));
            }
            if let Some(page) = end_page {
                scraper_config = scraper_config.with_end_page(page);
            }

            let mut scraper = WebScraper::new(
                scraper_config,
                SiteApi::new(),
                pool,
                client,
                artifacts,
                extractor,
            );
            let reason = scraper.run().await?;
            println!("Finished crawling: {reason}");
        }
        Commands::Extract { dir } => {
            let db = Database::connect(&cli.database).await?;
            let cache = EntityCache::load(&db).await?;
            let mut extractor =
                DataExtractor::new(db, cache, SITE_NAME, &Config::default().scraped_user);

            let store = ArtifactStore::open(dir);
            let totals = extractor.extract_directory(&store).await?;
            println!(
                "Extraction summary: {} new announcements, {} new vehicles, {} new sellers",
                totals.new_announcements, totals.new_vehicles, totals.new_sellers
            );
        }
        Commands::Proxies {
            country,
            anonymity,
            https_only,
            max_size,
            timeout,
            no_check,
        } => {
            let mut pool_config = PoolConfig::new()
                .with_anonymity(parse_anonymity(&anonymity)?)
                .with_https_only(https_only)
                .with_validation(!no_check);
            if !country.is_empty() {
                pool_config = pool_config.with_country_codes(country);
            }
            if let Some(max_size) = max_size {
                pool_config = pool_config.with_max_size(max_size);
            }

            let checker = ProxyChecker::with_config(
                CheckerConfig::new().with_timeout(Duration::from_secs(timeout)),
            );
            let pool = ProxyPool::new(default_providers(), checker, pool_config)?;
            let count = pool.refresh().await?;

            println!("{count} proxies available");
            for proxy in pool.snapshot() {
                let anonymity = proxy
                    .anonymity
                    .map(|level| level.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!(
                    "  {} ({}, {}, https: {})",
                    proxy.key(),
                    proxy.country_code.as_deref().unwrap_or("??"),
                    anonymity,
                    proxy.https
                );
            }
        }
    }

    Ok(())
}

fn parse_anonymity(values: &[String]) -> Result<Vec<Anonymity>> {
    values
        .iter()
        .map(|value| {
            Anonymity::parse(value).ok_or_else(|| {
                anyhow!(
                    "Invalid anonymity level: {}. Use: elite, anonymous, transparent",
                    value
                )
            })
        })
        .collect()
}
