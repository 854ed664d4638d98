//! Statisticars - Classified-Ad Harvester
//!
//! Harvests vehicle classified-ad listings from a public marketplace
//! through a rotating pool of validated third-party relays, writes every
//! raw response to durable artifacts, and persists only newly-seen
//! announcement/vehicle/seller records into a relational store.

pub mod database;
pub mod error;
pub mod extract;
pub mod models;
pub mod proxy;
pub mod scrape;
pub mod site;

pub use error::HarvestError;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database file path
    pub database_url: String,
    /// Root directory for raw response artifacts
    pub outputs_dir: std::path::PathBuf,
    /// Actor recorded on every scraped row
    pub scraped_user: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "statisticars.db".to_string(),
            outputs_dir: std::path::PathBuf::from("outputs"),
            scraped_user: "statisticars".to_string(),
        }
    }
}
