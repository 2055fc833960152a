use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Client, StatusCode,
};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{parse_profile, parse_symbols, ApiRateLimiter, TickerDataProvider};
use crate::error::{PipelineError, Result};
use crate::models::{Config, Statement, SymbolProfile};

const API_VERSION_PATH: [&str; 2] = ["api", "v1"];
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Fiindo API client
pub struct FiindoClient {
    client: Client,
    base_url: Url,
    headers: HeaderMap,
    rate_limiter: ApiRateLimiter,
}

impl FiindoClient {
    /// Create a new client; fails with `Authentication` when no identity is configured.
    pub fn new(config: &Config) -> Result<Self> {
        let identity = config.require_identity()?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", identity.bearer_token())).map_err(|_| {
            PipelineError::Authentication("API identity contains characters not allowed in a header".to_string())
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent("ticker-pipeline/0.1")
            .build()?;

        let base_url = Url::parse(&config.api_base_url)
            .map_err(|e| PipelineError::Config(format!("invalid API base URL '{}': {}", config.api_base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PipelineError::Config(format!("API base URL '{}' cannot carry a path", config.api_base_url)));
        }

        Ok(Self {
            client,
            base_url,
            headers,
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
        })
    }

    /// `{base}/api/v1/{segments...}`, with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(API_VERSION_PATH).extend(segments);
        }
        url
    }

    /// Make authenticated request to the API
    async fn make_request(&self, url: Url) -> Result<Value> {
        self.rate_limiter.wait().await;

        debug!("Making request to: {}", url);

        let response = self
            .client
            .get(url.clone())
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| PipelineError::Network(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PipelineError::Authentication(format!("GET {} returned {}", url, status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(PipelineError::Network(format!("GET {} returned {}: {}", url, status, excerpt)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| PipelineError::Network(format!("GET {} returned invalid JSON: {}", url, e)))
    }
}

#[async_trait]
impl TickerDataProvider for FiindoClient {
    async fn get_symbols(&self) -> Result<Vec<String>> {
        let data = self.make_request(self.endpoint(&["symbols"])).await?;
        let symbols = parse_symbols(&data);
        debug!("Retrieved {} symbols", symbols.len());
        Ok(symbols)
    }

    async fn get_profile(&self, symbol: &str) -> Result<SymbolProfile> {
        let data = self.make_request(self.endpoint(&["general", symbol])).await?;
        Ok(parse_profile(&data))
    }

    async fn get_eod(&self, symbol: &str) -> Result<Value> {
        self.make_request(self.endpoint(&["eod", symbol])).await
    }

    async fn get_statement(&self, symbol: &str, statement: Statement) -> Result<Value> {
        self.make_request(self.endpoint(&["financials", symbol, statement.as_str()])).await
    }
}
