//! Retrying fetch client over the rotating proxy pool
//!
//! One logical request is driven through randomly selected relays until a
//! clean response arrives or the retry budget runs out. Failures classify
//! into bot-block, geo-block and transport error; each class has its own
//! retirement policy and none of them surfaces past this module — the
//! caller only ever sees the payload or pool exhaustion, its signal to
//! refresh and back off, never a page failure.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use reqwest::{Client, Proxy as ReqwestProxy};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::HarvestError;
use crate::proxy::models::Proxy;
use crate::proxy::pool::ProxyPool;
use crate::site::{SiteRequest, BOT_BLOCK_SIGNATURE, GEO_BLOCK_SIGNATURE};
use crate::Result;

/// Default timeout for marketplace requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Default upper bound on retries for one logical request
const DEFAULT_MAX_RETRIES: usize = 10;

/// Configuration for the fetch client
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Hard timeout per attempt
    pub timeout: Duration,
    /// Retry ceiling; the effective budget is also bounded by the live
    /// pool size at call entry
    pub max_retries: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Classification of one response body against the known block signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    BotBlocked,
    GeoBlocked,
}

/// Pure body classification, independent of transport.
pub fn classify_body(body: &str) -> Outcome {
    if body.contains(BOT_BLOCK_SIGNATURE) {
        Outcome::BotBlocked
    } else if body.contains(GEO_BLOCK_SIGNATURE) {
        Outcome::GeoBlocked
    } else {
        Outcome::Success
    }
}

/// Fetch client shared by the orchestrator and the detail workers
#[derive(Clone)]
pub struct FetchClient {
    pool: Arc<ProxyPool>,
    config: FetchConfig,
}

impl FetchClient {
    pub fn new(pool: Arc<ProxyPool>, config: FetchConfig) -> Self {
        Self { pool, config }
    }

    /// Issue one logical request.
    ///
    /// Retirement policy per outcome: transport errors and geo-blocks
    /// retire the relay immediately; bot-blocks count against its block
    /// streak (the site, not the relay, may be at fault); success resets
    /// the streak and keeps the relay live for reuse.
    pub async fn fetch_json(
        &self,
        request: &SiteRequest,
    ) -> std::result::Result<Value, HarvestError> {
        let budget = self.config.max_retries.min(self.pool.len()).max(1);

        for attempt in 1..=budget {
            let Some(proxy) = self.pool.select() else {
                break;
            };
            let key = proxy.key();

            match self.attempt(request, &proxy).await {
                Ok(value) => {
                    self.pool.record_success(&key);
                    debug!(url = %request.url, proxy = %key, attempt, "fetch ok");
                    return Ok(value);
                }
                Err(HarvestError::BotBlocked) => {
                    debug!(url = %request.url, proxy = %key, attempt, "bot detection");
                    self.pool.record_block(&key);
                }
                Err(HarvestError::GeoBlocked) => {
                    debug!(url = %request.url, proxy = %key, attempt, "location block");
                    self.pool.retire(&key);
                }
                Err(error) => {
                    debug!(url = %request.url, proxy = %key, attempt, %error, "transport failure");
                    self.pool.retire(&key);
                }
            }
        }

        warn!(url = %request.url, budget, "retry budget exhausted");
        Err(HarvestError::PoolExhausted { attempts: budget })
    }

    /// One attempt through one relay, classified.
    async fn attempt(
        &self,
        request: &SiteRequest,
        proxy: &Proxy,
    ) -> std::result::Result<Value, HarvestError> {
        let body = self
            .send(request, proxy)
            .await
            .map_err(|error| HarvestError::Transport(error.to_string()))?;

        match classify_body(&body) {
            Outcome::BotBlocked => Err(HarvestError::BotBlocked),
            Outcome::GeoBlocked => Err(HarvestError::GeoBlocked),
            // A relay returning non-JSON for a JSON API is mangling traffic
            Outcome::Success => serde_json::from_str(&body)
                .map_err(|error| HarvestError::Transport(format!("non-JSON body: {error}"))),
        }
    }

    /// Raw send through one relay. Non-success statuses without a block
    /// signature are transport failures.
    async fn send(&self, request: &SiteRequest, proxy: &Proxy) -> Result<String> {
        let client = Client::builder()
            .proxy(ReqwestProxy::all(proxy.url())?)
            .timeout(self.config.timeout)
            .build()?;

        let mut builder = client.request(request.method.clone(), &request.url);
        for (name, value) in request.headers {
            builder = builder.header(*name, *value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() && classify_body(&body) == Outcome::Success {
            bail!("unexpected status {status}");
        }
        Ok(body)
    }
}
