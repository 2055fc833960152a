//! Properties of the transform over whole batches.

use chrono::Utc;
use pretty_assertions::assert_eq;
use test_log::test;
use ticker_pipeline::models::{Industry, RawTickerRecord};
use ticker_pipeline::transform::transform_records;

use crate::common::fixtures::raw_record;
use crate::common::logging;

fn mixed_batch() -> Vec<RawTickerRecord> {
    vec![
        raw_record("MSFT", "Software - Application", Some(100.0), Some(5.0)),
        raw_record("ADBE", "software-application", Some(50.0), Some(0.0)),
        raw_record("JPM", "Banks - Diversified", Some(150.0), Some(3.0)),
        raw_record("AAPL", "Consumer Electronics", None, Some(1.5)),
        raw_record("NVDA", "Semiconductors", Some(900.0), Some(10.0)),
        raw_record("XOM", "Unknown", Some(100.0), Some(2.0)),
    ]
}

#[test]
fn test_ticker_count_matches_filtered_rows() {
    logging::log_test_step("Checking ticker_count against filtered statistics");
    let output = transform_records(&mixed_batch(), Utc::now());

    assert_eq!(output.statistics.len(), 4);
    assert_eq!(output.dropped, 2);
    for agg in &output.aggregations {
        let rows = output.statistics.iter().filter(|s| s.industry == agg.industry).count();
        assert_eq!(agg.ticker_count, rows);
    }
    let total: usize = output.aggregations.iter().map(|a| a.ticker_count).sum();
    assert_eq!(total, output.statistics.len());
}

#[test]
fn test_records_outside_allow_list_never_appear() {
    let output = transform_records(&mixed_batch(), Utc::now());
    assert!(output.statistics.iter().all(|s| Industry::ALL.contains(&s.industry)));
    assert!(!output.statistics.iter().any(|s| s.symbol == "NVDA" || s.symbol == "XOM"));
}

#[test]
fn test_zero_and_missing_denominators_yield_null() {
    let mut record = raw_record("ZERO", "Banks - Diversified", Some(10.0), Some(0.0));
    record.income_statement = Some(serde_json::json!({"financials": {"income_statement": {"data": [
        {"revenue": 10.0, "netIncome": 1.0, "eps": 0.0},
        {"revenue": 0.0, "netIncome": 1.0, "eps": 1.0}
    ]}}}));
    record.balance_sheet_statement = Some(serde_json::json!({"financials": {"balance_sheet_statement": {"data": [
        {"totalDebt": 10.0, "totalEquity": 0.0}
    ]}}}));

    let output = transform_records(&[record], Utc::now());
    let stat = &output.statistics[0];
    assert_eq!(stat.pe_ratio, None);
    assert_eq!(stat.revenue_growth, None);
    assert_eq!(stat.debt_ratio, None);
    assert_eq!(stat.net_income_ttm, 2.0);
    assert_eq!(output.aggregations[0].avg_pe_ratio, None);
}

#[test]
fn test_end_to_end_example() {
    let records = vec![
        raw_record("AAA", "Software - Application", Some(100.0), Some(5.0)),
        raw_record("BBB", "Software - Application", Some(50.0), Some(0.0)),
        raw_record("CCC", "Banks - Diversified", Some(80.0), Some(4.0)),
    ];

    let output = transform_records(&records, Utc::now());
    logging::log_test_data("aggregations", &output.aggregations);

    let software = output
        .aggregations
        .iter()
        .find(|a| a.industry == Industry::SoftwareApplication)
        .expect("software aggregation");
    assert_eq!(software.avg_pe_ratio, Some(20.0));
    assert_eq!(software.ticker_count, 2);
    assert_eq!(software.pe_ratio_count, 1);
    assert_eq!(software.sum_revenue, 220.0);
    assert_eq!(software.avg_revenue_growth, Some(10.0));
}

#[test]
fn test_industry_labels_written_in_canonical_form() {
    let output = transform_records(&mixed_batch(), Utc::now());
    let json = serde_json::to_value(&output.statistics).unwrap();
    let adbe = json
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["symbol"] == "ADBE")
        .unwrap();
    assert_eq!(adbe["industry"], "Software - Application");
}
