use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::models::{Statement, SymbolProfile};

pub mod fiindo_client;
pub use fiindo_client::FiindoClient;

pub const UNKNOWN_INDUSTRY: &str = "Unknown";

/// Simple request pacing for API calls; zero requests per minute disables it.
pub struct ApiRateLimiter {
    delay: Option<Duration>,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let delay = if requests_per_minute > 0 {
            Some(Duration::from_millis(60_000 / requests_per_minute as u64))
        } else {
            None
        };

        Self { delay }
    }

    pub async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Source of raw ticker data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TickerDataProvider: Send + Sync {
    /// Every symbol the API knows about.
    async fn get_symbols(&self) -> Result<Vec<String>>;
    /// Industry and company name of one symbol.
    async fn get_profile(&self, symbol: &str) -> Result<SymbolProfile>;
    /// End-of-day price series.
    async fn get_eod(&self, symbol: &str) -> Result<Value>;
    /// One financial statement.
    async fn get_statement(&self, symbol: &str, statement: Statement) -> Result<Value>;
}

/// Extract the symbol list from a `/symbols` response.
pub fn parse_symbols(response: &Value) -> Vec<String> {
    let Some(entries) = response.get("symbols").and_then(|v| v.as_array()) else {
        warn!("Symbol list response has no 'symbols' array");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(symbol) => Some(symbol.clone()),
            Value::Object(obj) => obj.get("symbol").and_then(|s| s.as_str()).map(str::to_string),
            _ => None,
        })
        .filter(|symbol| !symbol.trim().is_empty())
        .collect()
}

/// Extract industry and company name from a `/general/{symbol}` response.
/// Unexpected shapes resolve to the `Unknown` industry.
pub fn parse_profile(response: &Value) -> SymbolProfile {
    let profile = response
        .get("fundamentals")
        .and_then(|f| f.get("profile"))
        .and_then(|p| p.get("data"))
        .and_then(|d| d.as_array())
        .and_then(|rows| rows.first());

    let industry = profile
        .and_then(|p| p.get("industry"))
        .and_then(|i| i.as_str())
        .filter(|i| !i.trim().is_empty())
        .unwrap_or(UNKNOWN_INDUSTRY)
        .to_string();
    let name = profile
        .and_then(|p| p.get("companyName").or_else(|| p.get("name")))
        .and_then(|n| n.as_str())
        .map(str::to_string);

    SymbolProfile { industry, name }
}
