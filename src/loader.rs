//! Load stage: persist the newest transformed snapshots into SQLite.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::database::{DatabaseSummary, PipelineDatabase};
use crate::error::Result;
use crate::models::{IndustryAggregation, TickerStatistic};
use crate::snapshot::{SnapshotStore, INDUSTRY_AGGREGATION_TAG, TICKER_STATISTICS_TAG};

/// Sample rows included in the load report.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

/// What one load run read and wrote.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub database: PathBuf,
    pub ticker_statistics_file: PathBuf,
    pub industry_aggregation_file: PathBuf,
    pub statistics_written: usize,
    pub aggregations_written: usize,
    pub summary: DatabaseSummary,
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "💾 Loaded into {}", self.database.display())?;
        writeln!(
            f,
            "   {} ticker statistics from {}",
            self.statistics_written,
            self.ticker_statistics_file.display()
        )?;
        writeln!(
            f,
            "   {} industry aggregations from {}",
            self.aggregations_written,
            self.industry_aggregation_file.display()
        )?;
        writeln!(f)?;
        write!(f, "{}", self.summary)
    }
}

/// Run the load stage: both snapshots must exist before the database is touched.
pub async fn run_load(store: &SnapshotStore, database_path: &Path, sample: usize) -> Result<LoadReport> {
    info!("💾 Starting load stage");

    let (ticker_statistics_file, statistics): (PathBuf, Vec<TickerStatistic>) =
        store.read_latest(TICKER_STATISTICS_TAG)?;
    let (industry_aggregation_file, aggregations): (PathBuf, Vec<IndustryAggregation>) =
        store.read_latest(INDUSTRY_AGGREGATION_TAG)?;

    let db = PipelineDatabase::open(database_path).await?;
    let statistics_written = db.upsert_ticker_statistics(&statistics).await?;
    let aggregations_written = db.upsert_industry_aggregations(&aggregations).await?;
    let summary = db.summary(sample).await?;
    db.close().await;

    info!(
        "✅ Load completed: {} ticker statistics, {} industry aggregations",
        statistics_written, aggregations_written
    );

    Ok(LoadReport {
        database: database_path.to_path_buf(),
        ticker_statistics_file,
        industry_aggregation_file,
        statistics_written,
        aggregations_written,
        summary,
    })
}
