//! Proxy listing providers
//!
//! Each provider publishes candidate relays with its own field layout; the
//! adapters normalize every row into the common [`Proxy`] shape. A provider
//! that fails to respond contributes nothing — discovery errors are logged
//! and never abort a refresh.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::proxy::models::{Anonymity, Proxy};
use crate::Result;

/// Rows of the free-proxy-list.net table:
/// IP, port, code, country, anonymity, google, https, last checked.
static TABLE_ROW_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)<tr>\s*<td>(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})</td>\s*<td>(\d{1,5})</td>\s*<td>([A-Z]{2})</td>\s*<td[^>]*>([^<]*)</td>\s*<td[^>]*>([^<]*)</td>\s*<td[^>]*>([^<]*)</td>\s*<td[^>]*>([^<]*)</td>\s*<td[^>]*>([^<]*)</td>",
    )
    .expect("Invalid proxy table regex")
});

/// Fallback pattern for plain IP:PORT dumps
static IP_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})\b")
        .expect("Invalid IP:PORT regex")
});

/// A provider of candidate relay listings
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch and normalize the provider's current candidate list
    async fn fetch(&self, client: &Client) -> Result<Vec<Proxy>>;
}

/// free-proxy-list.net: an HTML table of candidates
pub struct FreeProxyListProvider {
    url: String,
}

impl FreeProxyListProvider {
    pub fn new() -> Self {
        Self {
            url: "https://free-proxy-list.net/".to_string(),
        }
    }

    /// Parse the proxies table out of the page HTML.
    ///
    /// Rows whose anonymity literal is unknown are skipped; a page without
    /// any table rows falls back to bare IP:PORT extraction.
    pub fn parse_table(html: &str) -> Vec<Proxy> {
        let mut proxies = Vec::new();

        for caps in TABLE_ROW_REGEX.captures_iter(html) {
            let host = caps[1].to_string();
            let Ok(port) = caps[2].parse::<u16>() else {
                continue;
            };
            let Some(anonymity) = Anonymity::parse(&caps[5]) else {
                continue;
            };

            let mut proxy = Proxy::new(host, port);
            proxy.country_code = Some(caps[3].to_string());
            proxy.country = Some(caps[4].trim().to_string());
            proxy.anonymity = Some(anonymity);
            proxy.https = caps[7].trim().eq_ignore_ascii_case("yes");
            proxy.last_checked = Some(caps[8].trim().to_string());
            proxies.push(proxy);
        }

        if proxies.is_empty() {
            proxies = extract_with_regex(html);
        }

        proxies
    }
}

impl Default for FreeProxyListProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxyProvider for FreeProxyListProvider {
    fn name(&self) -> &str {
        "free-proxy-list.net"
    }

    async fn fetch(&self, client: &Client) -> Result<Vec<Proxy>> {
        let response = client.get(&self.url).send().await?;
        let content = response.text().await?;
        Ok(Self::parse_table(&content))
    }
}

/// geonode.com: a paginated JSON API of candidates
pub struct GeonodeProvider {
    base_url: String,
    page_size: usize,
}

impl GeonodeProvider {
    pub fn new() -> Self {
        Self {
            base_url: "https://proxylist.geonode.com/api/proxy-list".to_string(),
            page_size: 500,
        }
    }

    fn page_url(&self, page: usize) -> String {
        format!(
            "{}?limit={}&page={}&sort_by=lastChecked&sort_type=desc\
             &protocols=http%2Chttps&anonymityLevel=elite&anonymityLevel=anonymous",
            self.base_url, self.page_size, page
        )
    }

    /// Normalize one JSON page: `data` is an array of
    /// `{ip, port, country, anonymityLevel, protocols, lastChecked}`.
    pub fn parse_page(payload: &Value) -> Vec<Proxy> {
        let Some(entries) = payload.get("data").and_then(Value::as_array) else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| {
                let host = entry.get("ip")?.as_str()?.to_string();
                // Ports arrive as strings in this API
                let port: u16 = match entry.get("port")? {
                    Value::String(s) => s.parse().ok()?,
                    Value::Number(n) => u16::try_from(n.as_i64()?).ok()?,
                    _ => return None,
                };
                let anonymity = entry
                    .get("anonymityLevel")
                    .and_then(Value::as_str)
                    .and_then(Anonymity::parse)?;

                let mut proxy = Proxy::new(host, port);
                proxy.country_code = entry
                    .get("country")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                proxy.anonymity = Some(anonymity);
                proxy.https = entry
                    .get("protocols")
                    .and_then(Value::as_array)
                    .map(|protocols| {
                        protocols
                            .iter()
                            .any(|p| p.as_str() == Some("https"))
                    })
                    .unwrap_or(false);
                proxy.last_checked = entry
                    .get("lastChecked")
                    .and_then(Value::as_i64)
                    .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                    .map(|dt| dt.to_rfc3339());
                Some(proxy)
            })
            .collect()
    }
}

impl Default for GeonodeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxyProvider for GeonodeProvider {
    fn name(&self) -> &str {
        "geonode.com"
    }

    async fn fetch(&self, client: &Client) -> Result<Vec<Proxy>> {
        let mut proxies = Vec::new();
        let mut page = 1;

        loop {
            let response = client.get(self.page_url(page)).send().await?;
            let payload: Value = response.json().await?;
            let batch = Self::parse_page(&payload);
            debug!(provider = self.name(), page, count = batch.len(), "fetched provider page");
            if batch.is_empty() {
                break;
            }
            proxies.extend(batch);
            page += 1;
        }

        Ok(proxies)
    }
}

/// The providers queried by a default pool refresh
pub fn default_providers() -> Vec<Box<dyn ProxyProvider>> {
    vec![
        Box::new(FreeProxyListProvider::new()),
        Box::new(GeonodeProvider::new()),
    ]
}

/// Fetch every provider, tolerating individual failures, and deduplicate
/// the combined candidates by host:port.
pub async fn fetch_candidates(
    providers: &[Box<dyn ProxyProvider>],
    client: &Client,
) -> Vec<Proxy> {
    let mut candidates = Vec::new();

    for provider in providers {
        match provider.fetch(client).await {
            Ok(proxies) => {
                debug!(provider = provider.name(), count = proxies.len(), "provider fetch ok");
                candidates.extend(proxies);
            }
            Err(error) => {
                warn!(provider = provider.name(), %error, "provider fetch failed");
            }
        }
    }

    candidates.sort_by(|a, b| a.key().cmp(&b.key()));
    candidates.dedup_by(|a, b| a.host == b.host && a.port == b.port);
    candidates
}

fn extract_with_regex(content: &str) -> Vec<Proxy> {
    IP_PORT_REGEX
        .captures_iter(content)
        .filter_map(|cap| {
            let host = cap.get(1)?.as_str().to_string();
            let port: u16 = cap.get(2)?.as_str().parse().ok()?;

            for part in host.split('.') {
                let num: u32 = part.parse().ok()?;
                if num > 255 {
                    return None;
                }
            }
            if port == 0 {
                return None;
            }

            Some(Proxy::new(host, port))
        })
        .collect()
}
