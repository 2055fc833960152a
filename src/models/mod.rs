use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

pub mod industry;
pub use industry::Industry;

pub const DEFAULT_API_BASE_URL: &str = "https://api.test.fiindo.com";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_DATABASE_FILE: &str = "fiindo_challenge.db";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Identity used to build the API bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiIdentity {
    pub first_name: String,
    pub last_name: String,
}

impl ApiIdentity {
    /// Token sent as `Authorization: Bearer {first}.{last}`.
    pub fn bearer_token(&self) -> String {
        format!("{}.{}", self.first_name, self.last_name)
    }
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub identity: Option<ApiIdentity>,
    pub api_base_url: String,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub request_timeout: Duration,
    pub rate_limit_per_minute: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let identity = match (non_empty("FIINDO_FIRST_NAME"), non_empty("FIINDO_LAST_NAME")) {
            (Some(first_name), Some(last_name)) => Some(ApiIdentity { first_name, last_name }),
            _ => None,
        };

        let data_dir = non_empty("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let database_path = non_empty("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DEFAULT_DATABASE_FILE));

        let timeout_secs = parse_number("REQUEST_TIMEOUT_SECS", non_empty("REQUEST_TIMEOUT_SECS"), DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let rate_limit_per_minute = parse_number("RATE_LIMIT_PER_MINUTE", non_empty("RATE_LIMIT_PER_MINUTE"), 0)?;

        Ok(Config {
            identity,
            api_base_url: non_empty("FIINDO_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            data_dir,
            database_path,
            request_timeout: Duration::from_secs(timeout_secs),
            rate_limit_per_minute,
        })
    }

    /// Credentials for the remote API, required by the fetch stage only.
    pub fn require_identity(&self) -> Result<&ApiIdentity> {
        self.identity.as_ref().ok_or_else(|| {
            PipelineError::Authentication(
                "FIINDO_FIRST_NAME and FIINDO_LAST_NAME must be set".to_string(),
            )
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| PipelineError::Config(format!("{} must be a non-negative integer, got '{}'", key, value))),
    }
}

/// Financial statements served by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statement {
    IncomeStatement,
    BalanceSheetStatement,
    CashFlowStatement,
}

impl Statement {
    pub const ALL: [Statement; 3] = [
        Statement::IncomeStatement,
        Statement::BalanceSheetStatement,
        Statement::CashFlowStatement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Statement::IncomeStatement => "income_statement",
            Statement::BalanceSheetStatement => "balance_sheet_statement",
            Statement::CashFlowStatement => "cash_flow_statement",
        }
    }
}

/// Profile data returned by the `general` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolProfile {
    pub industry: String,
    pub name: Option<String>,
}

/// Local cache of symbol profiles, persisted between fetch runs.
pub type KnownSymbols = BTreeMap<String, SymbolProfile>;

/// Raw per-ticker payload exactly as fetched; immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTickerRecord {
    pub symbol: String,
    pub name: Option<String>,
    pub industry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eod: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_statement: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_sheet_statement: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_flow_statement: Option<Value>,
}

impl RawTickerRecord {
    pub fn new(symbol: &str, profile: &SymbolProfile) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: profile.name.clone(),
            industry: profile.industry.clone(),
            eod: None,
            income_statement: None,
            balance_sheet_statement: None,
            cash_flow_statement: None,
        }
    }

    pub fn statement(&self, statement: Statement) -> Option<&Value> {
        match statement {
            Statement::IncomeStatement => self.income_statement.as_ref(),
            Statement::BalanceSheetStatement => self.balance_sheet_statement.as_ref(),
            Statement::CashFlowStatement => self.cash_flow_statement.as_ref(),
        }
    }

    pub fn set_statement(&mut self, statement: Statement, payload: Value) {
        let slot = match statement {
            Statement::IncomeStatement => &mut self.income_statement,
            Statement::BalanceSheetStatement => &mut self.balance_sheet_statement,
            Statement::CashFlowStatement => &mut self.cash_flow_statement,
        };
        *slot = Some(payload);
    }
}

/// One quarterly income-statement row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomeQuarter {
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub eps: Option<f64>,
}

/// Typed view over the facts of a raw record. Each field is `None` when the
/// payload is missing or malformed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialFacts {
    pub price: Option<f64>,
    /// Newest first.
    pub quarters: Vec<IncomeQuarter>,
    pub total_debt: Option<f64>,
    pub total_equity: Option<f64>,
}

/// Per-ticker statistics written by the transform stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerStatistic {
    pub symbol: String,
    pub name: String,
    pub industry: Industry,
    pub pe_ratio: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub net_income_ttm: f64,
    /// Quarters summed into `net_income_ttm`; below 4 means a partial TTM.
    pub ttm_quarters: u8,
    pub debt_ratio: Option<f64>,
    pub price: Option<f64>,
    pub revenue_current: Option<f64>,
    pub last_updated: DateTime<Utc>,
    pub is_active: bool,
}

/// Per-industry aggregation written by the transform stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryAggregation {
    pub industry: Industry,
    pub avg_pe_ratio: Option<f64>,
    pub avg_revenue_growth: Option<f64>,
    pub sum_revenue: f64,
    pub ticker_count: usize,
    pub pe_ratio_count: usize,
    pub revenue_growth_count: usize,
    pub last_updated: DateTime<Utc>,
}

/// Summary of a fetch run, saved next to the raw snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub total_symbols_from_api: usize,
    pub filtered_symbols: usize,
    pub collected_symbols: usize,
    pub known_symbols_count: usize,
    pub symbols_by_industry: BTreeMap<String, usize>,
    pub collection_date: DateTime<Utc>,
    pub data_file: String,
}
