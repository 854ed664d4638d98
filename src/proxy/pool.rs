//! Live proxy pool: filtered, validated relays under concurrent consumption
//!
//! The pool exclusively owns the live set. Workers select random entries and
//! report failures back through keyed operations; all mutation is serialized
//! behind a mutex, so a retired entry can never be handed out again within
//! the same generation. When the set runs dry the caller triggers a wholesale
//! `refresh()` rather than retrying against an empty pool.

use std::sync::Mutex;

use rand::seq::SliceRandom;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::proxy::checker::ProxyChecker;
use crate::proxy::models::{Anonymity, Proxy};
use crate::proxy::sources::{self, ProxyProvider};
use crate::Result;

/// How many consecutive bot-blocks retire a proxy. A block can be the
/// site's fault rather than the relay's, so one block is tolerated; a
/// streak is treated as a burned relay. Any success resets the streak.
const MAX_CONSECUTIVE_BLOCKS: u32 = 3;

/// Filters and sizing applied when the pool is refreshed
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Keep only these ISO country codes (e.g., ["ES", "FR"])
    pub country_codes: Option<Vec<String>>,
    /// Keep only these anonymity levels
    pub anonymity: Option<Vec<Anonymity>>,
    /// Keep only HTTPS-capable relays
    pub https_only: bool,
    /// Cap the candidate set before validation
    pub max_size: Option<usize>,
    /// Probe candidates before admitting them (on by default)
    pub validate: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            country_codes: None,
            anonymity: None,
            https_only: false,
            max_size: None,
            validate: true,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_country_codes(mut self, codes: Vec<String>) -> Self {
        self.country_codes = Some(codes);
        self
    }

    pub fn with_anonymity(mut self, levels: Vec<Anonymity>) -> Self {
        self.anonymity = Some(levels);
        self
    }

    pub fn with_https_only(mut self, https_only: bool) -> Self {
        self.https_only = https_only;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Whether a candidate passes the configured filters
    pub fn matches(&self, proxy: &Proxy) -> bool {
        if let Some(codes) = &self.country_codes {
            match &proxy.country_code {
                Some(code) if codes.iter().any(|c| c == code) => {}
                _ => return false,
            }
        }
        if let Some(levels) = &self.anonymity {
            match proxy.anonymity {
                Some(level) if levels.contains(&level) => {}
                _ => return false,
            }
        }
        if self.https_only && !proxy.https {
            return false;
        }
        true
    }
}

struct Entry {
    proxy: Proxy,
    consecutive_blocks: u32,
}

/// The live, validated relay set
pub struct ProxyPool {
    providers: Vec<Box<dyn ProxyProvider>>,
    checker: ProxyChecker,
    config: PoolConfig,
    client: Client,
    live: Mutex<Vec<Entry>>,
}

impl ProxyPool {
    pub fn new(
        providers: Vec<Box<dyn ProxyProvider>>,
        checker: ProxyChecker,
        config: PoolConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            providers,
            checker,
            config,
            client,
            live: Mutex::new(Vec::new()),
        })
    }

    /// Replace the live set wholesale: discover, filter, cap, validate.
    ///
    /// Returns the new live count.
    pub async fn refresh(&self) -> Result<usize> {
        let candidates = sources::fetch_candidates(&self.providers, &self.client).await;
        debug!(candidates = candidates.len(), "provider discovery finished");

        let mut filtered: Vec<Proxy> = candidates
            .into_iter()
            .filter(|proxy| self.config.matches(proxy))
            .collect();
        if let Some(max_size) = self.config.max_size {
            filtered.truncate(max_size);
        }

        let live = if self.config.validate {
            self.checker.check_available(filtered).await
        } else {
            filtered
                .into_iter()
                .map(|mut proxy| {
                    proxy.available = true;
                    proxy
                })
                .collect()
        };

        let count = live.len();
        let entries = live
            .into_iter()
            .map(|proxy| Entry {
                proxy,
                consecutive_blocks: 0,
            })
            .collect();
        *self.live.lock().expect("proxy pool lock poisoned") = entries;

        info!(live = count, "proxy pool refreshed");
        Ok(count)
    }

    /// One live entry chosen uniformly at random, or `None` when the pool
    /// is empty. Never sequential: correlated selection produces
    /// correlated ban patterns.
    pub fn select(&self) -> Option<Proxy> {
        let live = self.live.lock().expect("proxy pool lock poisoned");
        live.choose(&mut rand::thread_rng())
            .map(|entry| entry.proxy.clone())
    }

    /// Remove an entry by its stable `host:port` key. Unknown keys are a
    /// no-op (another worker may have retired the same proxy first).
    pub fn retire(&self, key: &str) -> bool {
        let mut live = self.live.lock().expect("proxy pool lock poisoned");
        let before = live.len();
        live.retain(|entry| entry.proxy.key() != key);
        let removed = live.len() < before;
        if removed {
            debug!(proxy = key, remaining = live.len(), "proxy retired");
        }
        removed
    }

    /// Record a bot-block against a proxy. Returns true when the block
    /// streak reached the limit and the proxy was retired.
    pub fn record_block(&self, key: &str) -> bool {
        let mut live = self.live.lock().expect("proxy pool lock poisoned");
        let Some(index) = live.iter().position(|entry| entry.proxy.key() == key) else {
            return false;
        };
        live[index].consecutive_blocks += 1;
        if live[index].consecutive_blocks >= MAX_CONSECUTIVE_BLOCKS {
            live.remove(index);
            warn!(proxy = key, "proxy retired after repeated bot blocks");
            return true;
        }
        false
    }

    /// Record a successful fetch through a proxy, resetting its block streak.
    pub fn record_success(&self, key: &str) {
        let mut live = self.live.lock().expect("proxy pool lock poisoned");
        if let Some(entry) = live.iter_mut().find(|entry| entry.proxy.key() == key) {
            entry.consecutive_blocks = 0;
        }
    }

    /// Copy of the current live set, for reporting.
    pub fn snapshot(&self) -> Vec<Proxy> {
        self.live
            .lock()
            .expect("proxy pool lock poisoned")
            .iter()
            .map(|entry| entry.proxy.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.live.lock().expect("proxy pool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn proxy(host: &str, anonymity: Anonymity, code: &str) -> Proxy {
        let mut p = Proxy::new(host.to_string(), 8080);
        p.anonymity = Some(anonymity);
        p.country_code = Some(code.to_string());
        p
    }

    struct StaticProvider(Vec<Proxy>);

    #[async_trait]
    impl ProxyProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch(&self, _client: &Client) -> Result<Vec<Proxy>> {
            Ok(self.0.clone())
        }
    }

    fn pool_with(candidates: Vec<Proxy>, config: PoolConfig) -> ProxyPool {
        ProxyPool::new(
            vec![Box::new(StaticProvider(candidates))],
            ProxyChecker::new(),
            // Tests never probe the network
            config.with_validation(false),
        )
        .unwrap()
    }

    #[test]
    fn test_filters_match() {
        let config = PoolConfig::new().with_anonymity(vec![Anonymity::Elite]);
        assert!(config.matches(&proxy("1.1.1.1", Anonymity::Elite, "ES")));
        assert!(!config.matches(&proxy("2.2.2.2", Anonymity::Transparent, "US")));

        let config = PoolConfig::new().with_country_codes(vec!["ES".to_string()]);
        assert!(config.matches(&proxy("1.1.1.1", Anonymity::Elite, "ES")));
        assert!(!config.matches(&proxy("2.2.2.2", Anonymity::Elite, "FR")));

        let config = PoolConfig::new().with_https_only(true);
        assert!(!config.matches(&proxy("1.1.1.1", Anonymity::Elite, "ES")));
    }

    #[tokio::test]
    async fn test_refresh_applies_anonymity_filter() {
        // p1 elite/ES and p2 transparent/US with an elite-only filter:
        // the live pool ends up holding exactly p1.
        let p1 = proxy("1.1.1.1", Anonymity::Elite, "ES");
        let p2 = proxy("2.2.2.2", Anonymity::Transparent, "US");
        let pool = pool_with(
            vec![p1.clone(), p2],
            PoolConfig::new().with_anonymity(vec![Anonymity::Elite]),
        );

        let count = pool.refresh().await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(pool.select().unwrap().key(), p1.key());
    }

    #[tokio::test]
    async fn test_refresh_respects_max_size() {
        let candidates = (1..=5)
            .map(|i| proxy(&format!("10.0.0.{i}"), Anonymity::Elite, "ES"))
            .collect();
        let pool = pool_with(candidates, PoolConfig::new().with_max_size(2));
        assert_eq!(pool.refresh().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_select_never_returns_retired_proxy() {
        let p1 = proxy("1.1.1.1", Anonymity::Elite, "ES");
        let p2 = proxy("2.2.2.2", Anonymity::Elite, "ES");
        let pool = pool_with(vec![p1.clone(), p2.clone()], PoolConfig::new());
        pool.refresh().await.unwrap();

        assert!(pool.retire(&p1.key()));
        for _ in 0..50 {
            assert_eq!(pool.select().unwrap().key(), p2.key());
        }

        assert!(pool.retire(&p2.key()));
        assert!(pool.select().is_none());
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_retire_unknown_key_is_noop() {
        let pool = pool_with(
            vec![proxy("1.1.1.1", Anonymity::Elite, "ES")],
            PoolConfig::new(),
        );
        pool.refresh().await.unwrap();
        assert!(!pool.retire("9.9.9.9:1"));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_block_streak_retires_after_limit() {
        let p1 = proxy("1.1.1.1", Anonymity::Elite, "ES");
        let pool = pool_with(vec![p1.clone()], PoolConfig::new());
        pool.refresh().await.unwrap();

        assert!(!pool.record_block(&p1.key()));
        assert!(!pool.record_block(&p1.key()));
        assert_eq!(pool.len(), 1);
        // Third consecutive block crosses the limit
        assert!(pool.record_block(&p1.key()));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_success_resets_block_streak() {
        let p1 = proxy("1.1.1.1", Anonymity::Elite, "ES");
        let pool = pool_with(vec![p1.clone()], PoolConfig::new());
        pool.refresh().await.unwrap();

        pool.record_block(&p1.key());
        pool.record_block(&p1.key());
        pool.record_success(&p1.key());
        assert!(!pool.record_block(&p1.key()));
        assert_eq!(pool.len(), 1);
    }
}
