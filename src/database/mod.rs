//! SQLite persistence for ticker statistics and industry aggregations.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{Industry, IndustryAggregation, TickerStatistic};

pub const TICKER_STATISTICS_TABLE: &str = "ticker_statistics";
pub const INDUSTRY_AGGREGATION_TABLE: &str = "industry_aggregation";

const TICKER_STATISTICS_COLUMNS: [&str; 12] = [
    "symbol",
    "name",
    "industry",
    "pe_ratio",
    "revenue_growth",
    "net_income_ttm",
    "ttm_quarters",
    "debt_ratio",
    "price",
    "revenue_current",
    "last_updated",
    "is_active",
];
const INDUSTRY_AGGREGATION_COLUMNS: [&str; 8] = [
    "industry",
    "avg_pe_ratio",
    "avg_revenue_growth",
    "sum_revenue",
    "ticker_count",
    "pe_ratio_count",
    "revenue_growth_count",
    "last_updated",
];

/// Number of backups kept next to the database.
pub const BACKUPS_TO_KEEP: usize = 2;

/// Handle on the pipeline database.
#[derive(Clone, Debug)]
pub struct PipelineDatabase {
    pool: SqlitePool,
    path: PathBuf,
}

impl PipelineDatabase {
    /// Open (or create) the database at `path` and bring its schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        info!("🗄️  Opening database {}", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().filename(path).create_if_missing(true))
            .await?;

        sqlx::migrate!("./db/migrations")
            .run(&pool)
            .await
            .map_err(|e| PipelineError::Schema(format!("migrations failed: {}", e)))?;

        let db = Self {
            pool,
            path: path.to_path_buf(),
        };
        db.verify_tables().await?;
        Ok(db)
    }

    /// Open a database that must already exist, for read-only maintenance commands.
    pub async fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::Storage(format!("database {} does not exist", path.display())));
        }
        Self::open(path).await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn verify_tables(&self) -> Result<()> {
        for (table, required) in [
            (TICKER_STATISTICS_TABLE, &TICKER_STATISTICS_COLUMNS[..]),
            (INDUSTRY_AGGREGATION_TABLE, &INDUSTRY_AGGREGATION_COLUMNS[..]),
        ] {
            let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
                .bind(table)
                .fetch_all(&self.pool)
                .await?;
            if columns.is_empty() {
                return Err(PipelineError::Schema(format!("table '{}' is missing after migrations", table)));
            }

            let missing: Vec<&str> = required
                .iter()
                .copied()
                .filter(|column| !columns.iter().any(|c| c == column))
                .collect();
            if !missing.is_empty() {
                return Err(PipelineError::Schema(format!(
                    "table '{}' has an unexpected layout, missing columns: {}",
                    table,
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Highest successfully applied migration version.
    pub async fn schema_version(&self) -> Result<Option<i64>> {
        let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    /// Insert or replace every statistic in one transaction; returns rows written.
    pub async fn upsert_ticker_statistics(&self, statistics: &[TickerStatistic]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for stat in statistics {
            if let Err(e) = upsert_ticker_statistic(&mut *tx, stat).await {
                warn!("❌ Writing {} failed, rolling back {}", stat.symbol, TICKER_STATISTICS_TABLE);
                tx.rollback().await?;
                return Err(PipelineError::Storage(format!(
                    "{} row '{}': {}",
                    TICKER_STATISTICS_TABLE, stat.symbol, e
                )));
            }
        }

        tx.commit().await?;
        debug!("Upserted {} rows into {}", statistics.len(), TICKER_STATISTICS_TABLE);
        Ok(statistics.len())
    }

    /// Insert or replace every aggregation in one transaction; returns rows written.
    pub async fn upsert_industry_aggregations(&self, aggregations: &[IndustryAggregation]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for agg in aggregations {
            if let Err(e) = upsert_industry_aggregation(&mut *tx, agg).await {
                warn!("❌ Writing {} failed, rolling back {}", agg.industry, INDUSTRY_AGGREGATION_TABLE);
                tx.rollback().await?;
                return Err(PipelineError::Storage(format!(
                    "{} row '{}': {}",
                    INDUSTRY_AGGREGATION_TABLE, agg.industry, e
                )));
            }
        }

        tx.commit().await?;
        debug!("Upserted {} rows into {}", aggregations.len(), INDUSTRY_AGGREGATION_TABLE);
        Ok(aggregations.len())
    }

    pub async fn get_ticker_statistics(&self) -> Result<Vec<TickerStatistic>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, name, industry, pe_ratio, revenue_growth, net_income_ttm, ttm_quarters,
                   debt_ratio, price, revenue_current, last_updated, is_active
            FROM ticker_statistics
            ORDER BY symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ticker_statistic_from_row).collect()
    }

    pub async fn get_ticker_statistic(&self, symbol: &str) -> Result<Option<TickerStatistic>> {
        let row = sqlx::query(
            r#"
            SELECT symbol, name, industry, pe_ratio, revenue_growth, net_income_ttm, ttm_quarters,
                   debt_ratio, price, revenue_current, last_updated, is_active
            FROM ticker_statistics
            WHERE symbol = ?
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(ticker_statistic_from_row).transpose()
    }

    pub async fn get_industry_aggregations(&self) -> Result<Vec<IndustryAggregation>> {
        let rows = sqlx::query(
            r#"
            SELECT industry, avg_pe_ratio, avg_revenue_growth, sum_revenue, ticker_count,
                   pe_ratio_count, revenue_growth_count, last_updated
            FROM industry_aggregation
            ORDER BY industry
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(industry_aggregation_from_row).collect()
    }

    /// Counts, per-industry breakdown and up to `sample` ticker rows.
    pub async fn summary(&self, sample: usize) -> Result<DatabaseSummary> {
        let ticker_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ticker_statistics")
            .fetch_one(&self.pool)
            .await?;
        let active_tickers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ticker_statistics WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;
        let aggregation_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM industry_aggregation")
            .fetch_one(&self.pool)
            .await?;

        let industries = sqlx::query(
            r#"
            SELECT industry, COUNT(*) AS tickers, SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END) AS active
            FROM ticker_statistics
            GROUP BY industry
            ORDER BY industry
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(IndustryBreakdown {
                industry: row.try_get("industry")?,
                tickers: row.try_get("tickers")?,
                active: row.try_get("active")?,
            })
        })
        .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        let samples = sqlx::query(
            r#"
            SELECT symbol, name, industry, pe_ratio, revenue_growth, net_income_ttm, ttm_quarters,
                   debt_ratio, price, revenue_current, last_updated, is_active
            FROM ticker_statistics
            ORDER BY symbol
            LIMIT ?
            "#,
        )
        .bind(sample as i64)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(ticker_statistic_from_row)
        .collect::<Result<Vec<_>>>()?;

        Ok(DatabaseSummary {
            ticker_count,
            active_tickers,
            aggregation_count,
            industries,
            aggregations: self.get_industry_aggregations().await?,
            samples,
        })
    }

    /// Write a consistent copy to `<db>.backup.<timestamp>` and prune old backups.
    pub async fn backup(&self) -> Result<PathBuf> {
        let backup_path = next_backup_path(&self.path, Utc::now());

        sqlx::query("VACUUM INTO ?")
            .bind(backup_path.to_string_lossy().into_owned())
            .execute(&self.pool)
            .await?;

        let size = fs::metadata(&backup_path)?.len();
        info!("✅ Database backup created: {} ({} bytes)", backup_path.display(), size);

        cleanup_old_backups(&self.path)?;
        Ok(backup_path)
    }
}

async fn upsert_ticker_statistic(conn: &mut SqliteConnection, stat: &TickerStatistic) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO ticker_statistics (
            symbol, name, industry, pe_ratio, revenue_growth, net_income_ttm, ttm_quarters,
            debt_ratio, price, revenue_current, last_updated, is_active
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(symbol) DO UPDATE SET
            name = excluded.name,
            industry = excluded.industry,
            pe_ratio = excluded.pe_ratio,
            revenue_growth = excluded.revenue_growth,
            net_income_ttm = excluded.net_income_ttm,
            ttm_quarters = excluded.ttm_quarters,
            debt_ratio = excluded.debt_ratio,
            price = excluded.price,
            revenue_current = excluded.revenue_current,
            last_updated = excluded.last_updated,
            is_active = excluded.is_active
        "#,
    )
    .bind(&stat.symbol)
    .bind(&stat.name)
    .bind(stat.industry.as_str())
    .bind(stat.pe_ratio)
    .bind(stat.revenue_growth)
    .bind(stat.net_income_ttm)
    .bind(stat.ttm_quarters as i64)
    .bind(stat.debt_ratio)
    .bind(stat.price)
    .bind(stat.revenue_current)
    .bind(stat.last_updated)
    .bind(stat.is_active)
    .execute(conn)
    .await?;

    Ok(())
}

async fn upsert_industry_aggregation(
    conn: &mut SqliteConnection,
    agg: &IndustryAggregation,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO industry_aggregation (
            industry, avg_pe_ratio, avg_revenue_growth, sum_revenue, ticker_count,
            pe_ratio_count, revenue_growth_count, last_updated
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(industry) DO UPDATE SET
            avg_pe_ratio = excluded.avg_pe_ratio,
            avg_revenue_growth = excluded.avg_revenue_growth,
            sum_revenue = excluded.sum_revenue,
            ticker_count = excluded.ticker_count,
            pe_ratio_count = excluded.pe_ratio_count,
            revenue_growth_count = excluded.revenue_growth_count,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(agg.industry.as_str())
    .bind(agg.avg_pe_ratio)
    .bind(agg.avg_revenue_growth)
    .bind(agg.sum_revenue)
    .bind(agg.ticker_count as i64)
    .bind(agg.pe_ratio_count as i64)
    .bind(agg.revenue_growth_count as i64)
    .bind(agg.last_updated)
    .execute(conn)
    .await?;

    Ok(())
}

fn industry_from_row(row: &SqliteRow) -> Result<Industry> {
    let label: String = row.try_get("industry")?;
    Industry::parse(&label).ok_or_else(|| PipelineError::Storage(format!("unknown industry '{}' in database", label)))
}

fn ticker_statistic_from_row(row: &SqliteRow) -> Result<TickerStatistic> {
    let ttm_quarters: i64 = row.try_get("ttm_quarters")?;
    Ok(TickerStatistic {
        symbol: row.try_get("symbol")?,
        name: row.try_get("name")?,
        industry: industry_from_row(row)?,
        pe_ratio: row.try_get("pe_ratio")?,
        revenue_growth: row.try_get("revenue_growth")?,
        net_income_ttm: row.try_get("net_income_ttm")?,
        ttm_quarters: u8::try_from(ttm_quarters).unwrap_or(u8::MAX),
        debt_ratio: row.try_get("debt_ratio")?,
        price: row.try_get("price")?,
        revenue_current: row.try_get("revenue_current")?,
        last_updated: row.try_get::<DateTime<Utc>, _>("last_updated")?,
        is_active: row.try_get("is_active")?,
    })
}

fn industry_aggregation_from_row(row: &SqliteRow) -> Result<IndustryAggregation> {
    let count = |column: &str| -> Result<usize> {
        let value: i64 = row.try_get(column)?;
        Ok(usize::try_from(value).unwrap_or_default())
    };
    Ok(IndustryAggregation {
        industry: industry_from_row(row)?,
        avg_pe_ratio: row.try_get("avg_pe_ratio")?,
        avg_revenue_growth: row.try_get("avg_revenue_growth")?,
        sum_revenue: row.try_get("sum_revenue")?,
        ticker_count: count("ticker_count")?,
        pe_ratio_count: count("pe_ratio_count")?,
        revenue_growth_count: count("revenue_growth_count")?,
        last_updated: row.try_get::<DateTime<Utc>, _>("last_updated")?,
    })
}

fn backup_prefix(db_path: &Path) -> String {
    let file_name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "database".to_string());
    format!("{}.backup.", file_name)
}

/// First free `<db>.backup.<timestamp>[_NN]` path.
fn next_backup_path(db_path: &Path, at: DateTime<Utc>) -> PathBuf {
    let base = format!("{}{}", backup_prefix(db_path), at.format("%Y%m%d_%H%M%S"));
    let candidate = db_path.with_file_name(&base);
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| db_path.with_file_name(format!("{}_{:02}", base, n)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Remove all but the newest [`BACKUPS_TO_KEEP`] backups; returns how many were removed.
pub fn cleanup_old_backups(db_path: &Path) -> Result<usize> {
    let dir = match db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir.to_path_buf(),
        None => PathBuf::from("."),
    };
    let prefix = backup_prefix(db_path);

    let mut backups: Vec<PathBuf> = fs::read_dir(&dir)?
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.path())
        .collect();

    // Timestamped names sort oldest first.
    backups.sort();
    let excess = backups.len().saturating_sub(BACKUPS_TO_KEEP);

    let mut removed = 0;
    for old in backups.iter().take(excess) {
        match fs::remove_file(old) {
            Ok(()) => removed += 1,
            Err(e) => warn!("⚠️  Failed to remove old backup {}: {}", old.display(), e),
        }
    }
    if removed > 0 {
        info!("🧹 Cleaned up {} old backup files", removed);
    }
    Ok(removed)
}

/// Ticker counts for one industry.
#[derive(Debug, Clone, PartialEq)]
pub struct IndustryBreakdown {
    pub industry: String,
    pub tickers: i64,
    pub active: i64,
}

/// Snapshot of the database contents for reporting.
#[derive(Debug, Clone)]
pub struct DatabaseSummary {
    pub ticker_count: i64,
    pub active_tickers: i64,
    pub aggregation_count: i64,
    pub industries: Vec<IndustryBreakdown>,
    pub aggregations: Vec<IndustryAggregation>,
    pub samples: Vec<TickerStatistic>,
}

fn fmt_metric(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "n/a".to_string())
}

impl fmt::Display for DatabaseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📊 Database summary")?;
        writeln!(f, "   Ticker statistics:     {}", self.ticker_count)?;
        writeln!(f, "   Active tickers:        {}", self.active_tickers)?;
        writeln!(f, "   Industry aggregations: {}", self.aggregation_count)?;

        if !self.industries.is_empty() {
            writeln!(f)?;
            writeln!(f, "🏭 Tickers by industry")?;
            for row in &self.industries {
                writeln!(f, "   {:<24} {:>4} tickers ({} active)", row.industry, row.tickers, row.active)?;
            }
        }

        if !self.aggregations.is_empty() {
            writeln!(f)?;
            writeln!(f, "📈 Industry aggregations")?;
            for agg in &self.aggregations {
                writeln!(
                    f,
                    "   {:<24} avg P/E {:>8} ({}), avg growth {:>8}% ({}), revenue {:.0}",
                    agg.industry.as_str(),
                    fmt_metric(agg.avg_pe_ratio),
                    agg.pe_ratio_count,
                    fmt_metric(agg.avg_revenue_growth),
                    agg.revenue_growth_count,
                    agg.sum_revenue
                )?;
            }
        }

        if !self.samples.is_empty() {
            writeln!(f)?;
            writeln!(f, "🔎 Sample tickers")?;
            for stat in &self.samples {
                writeln!(
                    f,
                    "   {:<8} {:<24} P/E {:>8}  growth {:>8}%  debt ratio {:>6}  NI TTM {:.0} ({}q)",
                    stat.symbol,
                    stat.industry.as_str(),
                    fmt_metric(stat.pe_ratio),
                    fmt_metric(stat.revenue_growth),
                    fmt_metric(stat.debt_ratio),
                    stat.net_income_ttm,
                    stat.ttm_quarters
                )?;
            }
        }

        Ok(())
    }
}
