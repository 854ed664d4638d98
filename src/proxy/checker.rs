//! Proxy checker module for validating candidate relays
//!
//! Candidates are probed concurrently against the harvest target itself: a
//! relay that cannot reach the marketplace is useless here no matter what it
//! can reach elsewhere. One failed probe marks the candidate unavailable for
//! the pass — there is no per-probe retry.

use crate::proxy::models::{Proxy, ProxyCheckResult};
use crate::site::SITE_ROOT;
use crate::Result;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Proxy as ReqwestProxy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Default timeout for proxy checks in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 3;

/// Default number of concurrent checks
const DEFAULT_CONCURRENCY: usize = 10;

/// Configuration for proxy checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Timeout for each proxy check
    pub timeout: Duration,
    /// Number of concurrent checks
    pub concurrency: usize,
    /// URL to test proxies against
    pub check_url: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            check_url: SITE_ROOT.to_string(),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_check_url(mut self, url: String) -> Self {
        self.check_url = url;
        self
    }
}

/// Proxy checker for validating candidate relays
#[derive(Clone)]
pub struct ProxyChecker {
    config: CheckerConfig,
}

impl ProxyChecker {
    /// Create a new proxy checker with default configuration
    pub fn new() -> Self {
        Self {
            config: CheckerConfig::default(),
        }
    }

    /// Create a new proxy checker with custom configuration
    pub fn with_config(config: CheckerConfig) -> Self {
        Self { config }
    }

    /// Probe a single candidate.
    ///
    /// Available iff the request completes without transport error within
    /// the timeout; the response status does not matter — block pages are
    /// the fetch client's concern, reachability is ours.
    pub async fn check_proxy(&self, proxy: &Proxy) -> ProxyCheckResult {
        let start = Instant::now();

        match self.create_client(proxy) {
            Ok(client) => {
                match tokio::time::timeout(
                    self.config.timeout,
                    client.get(&self.config.check_url).send(),
                )
                .await
                {
                    Ok(Ok(_response)) => {
                        let elapsed = start.elapsed().as_millis() as u64;
                        ProxyCheckResult::working(proxy.clone(), elapsed)
                    }
                    Ok(Err(e)) => ProxyCheckResult::failed(proxy.clone(), e.to_string()),
                    Err(_) => ProxyCheckResult::timeout(proxy.clone()),
                }
            }
            Err(e) => ProxyCheckResult::failed(proxy.clone(), e.to_string()),
        }
    }

    /// Check multiple candidates concurrently
    pub async fn check_proxies(&self, proxies: Vec<Proxy>) -> Vec<ProxyCheckResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        stream::iter(proxies)
            .map(|proxy| {
                let sem = Arc::clone(&semaphore);
                let checker = self.clone();
                async move {
                    // Semaphore acquire only fails if the semaphore is closed,
                    // which won't happen here since we own the Arc and keep it
                    // alive for the duration of the check operation.
                    let _permit = sem
                        .acquire()
                        .await
                        .expect("Semaphore closed unexpectedly");
                    checker.check_proxy(&proxy).await
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect::<Vec<_>>()
            .await
    }

    /// Check candidates and keep only the ones that answered, marked
    /// available.
    pub async fn check_available(&self, proxies: Vec<Proxy>) -> Vec<Proxy> {
        self.check_proxies(proxies)
            .await
            .into_iter()
            .filter(|result| result.is_working())
            .map(|result| {
                let mut proxy = result.proxy;
                proxy.available = true;
                proxy
            })
            .collect()
    }

    /// Create a reqwest client routed through the candidate
    fn create_client(&self, proxy: &Proxy) -> Result<Client> {
        let reqwest_proxy = ReqwestProxy::all(proxy.url())?;

        let client = Client::builder()
            .proxy(reqwest_proxy)
            .timeout(self.config.timeout)
            .build()?;

        Ok(client)
    }
}

impl Default for ProxyChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checker_config_default() {
        let config = CheckerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.check_url, SITE_ROOT);
    }

    #[test]
    fn test_checker_config_builder() {
        let config = CheckerConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_concurrency(20)
            .with_check_url("http://example.com".to_string());

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.concurrency, 20);
        assert_eq!(config.check_url, "http://example.com");
    }

    #[test]
    fn test_proxy_checker_creation() {
        let checker = ProxyChecker::new();
        assert_eq!(checker.config.concurrency, DEFAULT_CONCURRENCY);
    }
}
