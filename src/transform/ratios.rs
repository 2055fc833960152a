//! Per-ticker formulas. Every ratio is `None` when an input is missing or
//! the denominator is zero.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::{FinancialFacts, IncomeQuarter, Industry, RawTickerRecord, TickerStatistic};

use super::extract::extract_facts;

pub const TTM_QUARTERS: usize = 4;

fn safe_divide(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator).filter(|r| r.is_finite())
}

/// Price over the latest quarter's earnings per share.
pub fn pe_ratio(price: Option<f64>, eps: Option<f64>) -> Option<f64> {
    safe_divide(price?, eps?)
}

/// Quarter-over-quarter revenue growth in percent, relative to |prior|.
pub fn revenue_growth(current: Option<f64>, prior: Option<f64>) -> Option<f64> {
    let (current, prior) = (current?, prior?);
    safe_divide((current - prior) * 100.0, prior.abs())
}

/// Net income summed over the trailing four quarters.
///
/// Quarters without a net income are skipped and fewer than four quarters
/// are summed as available; the second value is how many were summed.
pub fn net_income_ttm(quarters: &[IncomeQuarter]) -> (f64, u8) {
    quarters
        .iter()
        .take(TTM_QUARTERS)
        .filter_map(|q| q.net_income)
        .fold((0.0, 0u8), |(sum, count), n| (sum + n, count + 1))
}

/// Total debt over total equity. Negative equity is passed through.
pub fn debt_ratio(total_debt: Option<f64>, total_equity: Option<f64>) -> Option<f64> {
    safe_divide(total_debt?, total_equity?)
}

/// Statistics for one record already known to be in an allowed industry.
pub fn ticker_statistic(record: &RawTickerRecord, industry: Industry, at: DateTime<Utc>) -> TickerStatistic {
    let facts = extract_facts(record);
    statistic_from_facts(record, industry, &facts, at)
}

pub fn statistic_from_facts(
    record: &RawTickerRecord,
    industry: Industry,
    facts: &FinancialFacts,
    at: DateTime<Utc>,
) -> TickerStatistic {
    let latest = facts.quarters.first();
    let prior = facts.quarters.get(1);
    let revenue_current = latest.and_then(|q| q.revenue);

    let (net_income_ttm, ttm_quarters) = net_income_ttm(&facts.quarters);
    if (ttm_quarters as usize) < TTM_QUARTERS {
        warn!(
            "⚠️  {}: net income TTM covers only {} of {} quarters",
            record.symbol, ttm_quarters, TTM_QUARTERS
        );
    }

    TickerStatistic {
        symbol: record.symbol.clone(),
        name: record.name.clone().unwrap_or_else(|| record.symbol.clone()),
        industry,
        pe_ratio: pe_ratio(facts.price, latest.and_then(|q| q.eps)),
        revenue_growth: revenue_growth(revenue_current, prior.and_then(|q| q.revenue)),
        net_income_ttm,
        ttm_quarters,
        debt_ratio: debt_ratio(facts.total_debt, facts.total_equity),
        price: facts.price,
        revenue_current,
        last_updated: at,
        is_active: facts.price.is_some(),
    }
}
