//! Error taxonomy for the harvesting pipeline

use thiserror::Error;

/// Failure classes produced by the acquisition and load layers.
///
/// Transport and block failures are handled inside the fetch client
/// (retire + retry) and only surface as an overall pool-exhausted outcome.
/// Extraction failures are per-item, persistence failures per-batch; neither
/// aborts a run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("response flagged as automated traffic")]
    BotBlocked,

    #[error("response blocked by location restriction")]
    GeoBlocked,

    #[error("proxy pool exhausted after {attempts} attempts")]
    PoolExhausted { attempts: usize },

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),
}
