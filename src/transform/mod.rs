//! Transform stage: raw snapshot in, ticker statistics and industry
//! aggregations out.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{Industry, IndustryAggregation, RawTickerRecord, TickerStatistic};
use crate::snapshot::{SnapshotStore, INDUSTRY_AGGREGATION_TAG, RAW_TAG, TICKER_STATISTICS_TAG};

pub mod aggregate;
pub mod extract;
pub mod ratios;

pub use aggregate::aggregate_by_industry;
pub use extract::extract_facts;
pub use ratios::ticker_statistic;

/// Allow-listed industry of a raw record, if any.
pub fn allowed_industry(record: &RawTickerRecord) -> Option<Industry> {
    Industry::parse(&record.industry)
}

/// Result of transforming one batch of raw records.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub statistics: Vec<TickerStatistic>,
    pub aggregations: Vec<IndustryAggregation>,
    /// Records dropped for an industry outside the allow-list.
    pub dropped: usize,
    /// Repeated symbols; only the first occurrence is kept.
    pub duplicates: usize,
}

/// Filter, compute statistics and aggregate, all at timestamp `at`.
pub fn transform_records(records: &[RawTickerRecord], at: DateTime<Utc>) -> TransformOutput {
    let mut seen = HashSet::new();
    let mut statistics = Vec::with_capacity(records.len());
    let mut dropped = 0;
    let mut duplicates = 0;

    for record in records {
        let Some(industry) = allowed_industry(record) else {
            debug!("Dropping {} ({} - not a target industry)", record.symbol, record.industry);
            dropped += 1;
            continue;
        };
        if !seen.insert(record.symbol.as_str()) {
            warn!("Duplicate symbol {} in raw snapshot, keeping the first record", record.symbol);
            duplicates += 1;
            continue;
        }
        statistics.push(ticker_statistic(record, industry, at));
    }

    let aggregations = aggregate_by_industry(&statistics, at);

    TransformOutput {
        statistics,
        aggregations,
        dropped,
        duplicates,
    }
}

/// Files read and written by one transform run.
#[derive(Debug, Clone)]
pub struct TransformReport {
    pub source: PathBuf,
    pub ticker_statistics_file: PathBuf,
    pub industry_aggregation_file: PathBuf,
    pub output: TransformOutput,
}

/// Run the transform stage against the newest raw snapshot in `store`.
pub fn run_transform(store: &SnapshotStore) -> Result<TransformReport> {
    info!("🧮 Starting transform stage");

    let (source, records): (PathBuf, Vec<RawTickerRecord>) = store.read_latest(RAW_TAG)?;
    info!("📊 Analysing {} raw records", records.len());

    let at = Utc::now();
    let output = transform_records(&records, at);

    info!(
        "✅ {} tickers kept, {} dropped outside target industries",
        output.statistics.len(),
        output.dropped
    );
    for agg in &output.aggregations {
        info!(
            "  • {}: {} tickers, avg P/E {:?} (from {}), avg growth {:?} (from {}), revenue {:.0}",
            agg.industry,
            agg.ticker_count,
            agg.avg_pe_ratio,
            agg.pe_ratio_count,
            agg.avg_revenue_growth,
            agg.revenue_growth_count,
            agg.sum_revenue
        );
    }

    let ticker_statistics_file = store.write(TICKER_STATISTICS_TAG, at, &output.statistics)?;
    let industry_aggregation_file = store.write(INDUSTRY_AGGREGATION_TAG, at, &output.aggregations)?;

    Ok(TransformReport {
        source,
        ticker_statistics_file,
        industry_aggregation_file,
        output,
    })
}
