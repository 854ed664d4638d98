//! Proxy data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Anonymity level reported by a proxy listing provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anonymity {
    Elite,
    Anonymous,
    Transparent,
}

impl Anonymity {
    /// Parse the literals the listing providers use. Unknown literals map
    /// to `None` and the row is skipped by the provider adapter.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "elite proxy" | "elite" | "alto anonimato" => Some(Anonymity::Elite),
            "anonymous" | "anónimo" => Some(Anonymity::Anonymous),
            "transparent" | "transparente" => Some(Anonymity::Transparent),
            _ => None,
        }
    }
}

impl fmt::Display for Anonymity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anonymity::Elite => write!(f, "elite"),
            Anonymity::Anonymous => write!(f, "anonymous"),
            Anonymity::Transparent => write!(f, "transparent"),
        }
    }
}

/// A single relay candidate as reported by a listing provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    /// ISO 3166-1 alpha-2 country code (e.g., "ES", "US")
    pub country_code: Option<String>,
    pub country: Option<String>,
    pub anonymity: Option<Anonymity>,
    /// Whether the relay supports HTTPS traffic
    pub https: bool,
    /// Provider-reported freshness, free text (e.g., "10 secs ago")
    pub last_checked: Option<String>,
    pub found_date: DateTime<Utc>,
    /// Set by the validator; candidates start unverified
    pub available: bool,
}

impl Proxy {
    /// Create a new unverified candidate
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            country_code: None,
            country: None,
            anonymity: None,
            https: false,
            last_checked: None,
            found_date: Utc::now(),
            available: false,
        }
    }

    /// Stable identity used for keyed removal from the live pool
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the proxy URL string
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Result of one validation probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProxyCheckStatus {
    Working,
    Failed(String),
    Timeout,
}

/// Detailed result of a proxy check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyCheckResult {
    pub proxy: Proxy,
    pub status: ProxyCheckStatus,
    pub response_time_ms: Option<u64>,
}

impl ProxyCheckResult {
    pub fn working(proxy: Proxy, response_time_ms: u64) -> Self {
        Self {
            proxy,
            status: ProxyCheckStatus::Working,
            response_time_ms: Some(response_time_ms),
        }
    }

    pub fn failed(proxy: Proxy, error: String) -> Self {
        Self {
            proxy,
            status: ProxyCheckStatus::Failed(error),
            response_time_ms: None,
        }
    }

    pub fn timeout(proxy: Proxy) -> Self {
        Self {
            proxy,
            status: ProxyCheckStatus::Timeout,
            response_time_ms: None,
        }
    }

    pub fn is_working(&self) -> bool {
        matches!(self.status, ProxyCheckStatus::Working)
    }
}
