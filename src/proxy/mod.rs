//! Proxy module for discovering, validating and rotating relays
//!
//! This module provides functionality for:
//! - Fetching candidate relay lists from listing providers
//! - Checking candidate validity with bounded concurrency
//! - Owning the live pool consumed by the crawl workers (random selection,
//!   keyed retirement, wholesale refresh)

pub mod checker;
pub mod models;
pub mod pool;
pub mod sources;

pub use checker::{CheckerConfig, ProxyChecker};
pub use models::{Anonymity, Proxy, ProxyCheckResult, ProxyCheckStatus};
pub use pool::{PoolConfig, ProxyPool};
pub use sources::{default_providers, FreeProxyListProvider, GeonodeProvider, ProxyProvider};
