//! Tolerant extraction of typed facts from raw API payloads.
//!
//! Nothing here fails: a missing or malformed field becomes `None` and the
//! remaining facts of the record are still extracted.

use serde_json::Value;

use crate::models::{FinancialFacts, IncomeQuarter, RawTickerRecord, Statement};

const PRICE_PATH: [&str; 2] = ["stockprice", "data"];
const ANNUAL_PERIOD: &str = "FY";

const REVENUE_KEYS: [&str; 1] = ["revenue"];
const NET_INCOME_KEYS: [&str; 1] = ["netIncome"];
const EPS_KEYS: [&str; 3] = ["eps", "epsDiluted", "epsdiluted"];
const TOTAL_DEBT_KEYS: [&str; 1] = ["totalDebt"];
const TOTAL_EQUITY_KEYS: [&str; 2] = ["totalEquity", "totalStockholdersEquity"];

pub fn extract_facts(record: &RawTickerRecord) -> FinancialFacts {
    let quarters = record
        .statement(Statement::IncomeStatement)
        .and_then(|payload| statement_rows(payload, Statement::IncomeStatement))
        .map(|rows| quarterly_rows(rows).map(income_quarter).collect())
        .unwrap_or_default();

    let balance = record
        .statement(Statement::BalanceSheetStatement)
        .and_then(|payload| statement_rows(payload, Statement::BalanceSheetStatement))
        .and_then(|rows| latest_fiscal_year(rows));

    FinancialFacts {
        price: record.eod.as_ref().and_then(latest_price),
        quarters,
        total_debt: balance.and_then(|row| field(row, &TOTAL_DEBT_KEYS)),
        total_equity: balance.and_then(|row| field(row, &TOTAL_EQUITY_KEYS)),
    }
}

/// Close of the newest (last) entry of the end-of-day series.
pub fn latest_price(eod: &Value) -> Option<f64> {
    find_nested(eod, &PRICE_PATH)
        .and_then(|data| data.as_array())
        .and_then(|rows| rows.last())
        .and_then(|row| field(row, &["close"]))
}

/// Rows of `financials.<statement>.data`, searched anywhere in the payload.
pub fn statement_rows(payload: &Value, statement: Statement) -> Option<&Vec<Value>> {
    find_nested(payload, &["financials", statement.as_str(), "data"]).and_then(|data| data.as_array())
}

/// Quarterly rows, newest first. When no row carries a `period`, every row
/// is taken as a quarter.
fn quarterly_rows(rows: &[Value]) -> impl Iterator<Item = &Value> {
    let has_periods = rows.iter().any(|row| period(row).is_some());
    rows.iter().filter(move |row| !has_periods || !is_annual(row))
}

/// First annual row, or the first row when none is marked annual.
fn latest_fiscal_year(rows: &[Value]) -> Option<&Value> {
    rows.iter().find(|row| is_annual(row)).or_else(|| rows.first())
}

fn income_quarter(row: &Value) -> IncomeQuarter {
    IncomeQuarter {
        revenue: field(row, &REVENUE_KEYS),
        net_income: field(row, &NET_INCOME_KEYS),
        eps: field(row, &EPS_KEYS),
    }
}

fn period(row: &Value) -> Option<&str> {
    row.get("period").and_then(|p| p.as_str())
}

fn is_annual(row: &Value) -> bool {
    period(row).is_some_and(|p| p.trim().eq_ignore_ascii_case(ANNUAL_PERIOD))
}

/// First key present with a usable number.
fn field(row: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| row.get(*key).and_then(number))
}

/// Finite number from a JSON number or a numeric string.
pub fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

/// Depth-first search for the first node where `path` resolves.
fn find_nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let direct = path.iter().try_fold(value, |node, key| node.get(*key));
    if direct.is_some() {
        return direct;
    }

    match value {
        Value::Object(map) => map.values().find_map(|child| find_nested(child, path)),
        Value::Array(items) => items.iter().find_map(|child| find_nested(child, path)),
        _ => None,
    }
}
