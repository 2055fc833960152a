//! Loader and database behaviour on a real SQLite file.

use assert_matches::assert_matches;
use chrono::Utc;
use pretty_assertions::assert_eq;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use ticker_pipeline::database::PipelineDatabase;
use ticker_pipeline::loader::run_load;
use ticker_pipeline::models::Industry;
use ticker_pipeline::snapshot::{INDUSTRY_AGGREGATION_TAG, TICKER_STATISTICS_TAG};
use ticker_pipeline::PipelineError;

use crate::common::fixtures::{aggregation, statistic};
use crate::common::{logging, TestEnv};

fn write_transformed_snapshots(env: &TestEnv) {
    let at = Utc::now();
    let statistics = vec![
        statistic("MSFT", Industry::SoftwareApplication, Some(20.0), at),
        statistic("JPM", Industry::BanksDiversified, None, at),
    ];
    let aggregations = vec![
        aggregation(Industry::BanksDiversified, None, 1, at),
        aggregation(Industry::SoftwareApplication, Some(20.0), 1, at),
    ];
    env.store.write(TICKER_STATISTICS_TAG, at, &statistics).unwrap();
    env.store.write(INDUSTRY_AGGREGATION_TAG, at, &aggregations).unwrap();
}

#[test_log::test(tokio::test)]
async fn test_load_is_idempotent() {
    logging::log_test_step("Loading the same snapshot twice");
    let env = TestEnv::new();
    write_transformed_snapshots(&env);

    let first = run_load(&env.store, &env.db_path, 5).await.unwrap();
    let second = run_load(&env.store, &env.db_path, 5).await.unwrap();

    assert_eq!(first.statistics_written, 2);
    assert_eq!(second.summary.ticker_count, 2);
    assert_eq!(second.summary.aggregation_count, 2);
    assert_eq!(second.summary.active_tickers, 2);
    assert_eq!(second.summary.samples.len(), 2);

    let report = second.to_string();
    assert!(report.contains("Banks - Diversified"));
    assert!(report.contains("MSFT"));
}

#[test_log::test(tokio::test)]
async fn test_nullable_metrics_round_trip() {
    let env = TestEnv::new();
    write_transformed_snapshots(&env);
    run_load(&env.store, &env.db_path, 0).await.unwrap();

    let db = PipelineDatabase::open(&env.db_path).await.unwrap();
    let jpm = db.get_ticker_statistic("JPM").await.unwrap().expect("JPM row");
    assert_eq!(jpm.pe_ratio, None);
    assert_eq!(jpm.industry, Industry::BanksDiversified);
    assert_eq!(jpm.ttm_quarters, 2);

    let aggregations = db.get_industry_aggregations().await.unwrap();
    assert_eq!(aggregations.len(), 2);
    assert_eq!(aggregations[0].industry, Industry::BanksDiversified);
    assert_eq!(aggregations[0].avg_pe_ratio, None);
    assert_eq!(aggregations[1].avg_pe_ratio, Some(20.0));
    assert_eq!(aggregations[1].pe_ratio_count, 1);
    db.close().await;
}

#[test_log::test(tokio::test)]
async fn test_upsert_replaces_existing_row() {
    let env = TestEnv::new();
    let db = PipelineDatabase::open(&env.db_path).await.unwrap();
    let at = Utc::now();

    db.upsert_ticker_statistics(&[statistic("MSFT", Industry::SoftwareApplication, Some(10.0), at)])
        .await
        .unwrap();
    let mut updated = statistic("MSFT", Industry::SoftwareApplication, Some(30.0), at);
    updated.is_active = false;
    db.upsert_ticker_statistics(&[updated]).await.unwrap();

    let rows = db.get_ticker_statistics().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].pe_ratio, Some(30.0));
    assert!(!rows[0].is_active);
    db.close().await;
}

#[test_log::test(tokio::test)]
async fn test_failing_row_rolls_back_whole_batch() {
    let env = TestEnv::new();
    let db = PipelineDatabase::open(&env.db_path).await.unwrap();
    let at = Utc::now();

    db.upsert_ticker_statistics(&[statistic("MSFT", Industry::SoftwareApplication, Some(10.0), at)])
        .await
        .unwrap();
    let before = db.get_ticker_statistics().await.unwrap();

    let batch = vec![
        statistic("MSFT", Industry::SoftwareApplication, Some(99.0), at),
        statistic("AAPL", Industry::ConsumerElectronics, Some(30.0), at),
        statistic("", Industry::ConsumerElectronics, Some(1.0), at),
    ];
    let result = db.upsert_ticker_statistics(&batch).await;
    assert_matches!(result, Err(PipelineError::Storage(_)));

    let after = db.get_ticker_statistics().await.unwrap();
    assert_eq!(after, before);
    db.close().await;
}

#[test_log::test(tokio::test)]
async fn test_missing_transformed_snapshot_leaves_database_untouched() {
    let env = TestEnv::new();

    let result = run_load(&env.store, &env.db_path, 5).await;
    assert_matches!(result, Err(PipelineError::MissingSnapshot { tag, .. }) if tag == TICKER_STATISTICS_TAG);
    assert!(!env.db_path.exists());
}

#[test_log::test(tokio::test)]
async fn test_schema_version_recorded() {
    let env = TestEnv::new();
    let db = PipelineDatabase::open(&env.db_path).await.unwrap();
    assert_eq!(db.schema_version().await.unwrap(), Some(20250101000000));
    db.close().await;

    // Reopening an up-to-date database applies nothing new.
    let db = PipelineDatabase::open(&env.db_path).await.unwrap();
    assert_eq!(db.summary(5).await.unwrap().ticker_count, 0);
    db.close().await;
}

#[test_log::test(tokio::test)]
async fn test_backup_keeps_two_newest() {
    let env = TestEnv::new();
    write_transformed_snapshots(&env);
    run_load(&env.store, &env.db_path, 0).await.unwrap();

    let db = PipelineDatabase::open(&env.db_path).await.unwrap();
    let mut written = Vec::new();
    for _ in 0..3 {
        written.push(db.backup().await.unwrap());
    }
    db.close().await;

    let backups: Vec<_> = std::fs::read_dir(env.dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("pipeline_test.db.backup."))
        .collect();
    assert_eq!(backups.len(), 2);
    assert!(written[2].exists());

    let copy = PipelineDatabase::open(&written[2]).await.unwrap();
    assert_eq!(copy.summary(0).await.unwrap().ticker_count, 2);
    copy.close().await;
}

async fn raw_pool(path: &std::path::Path) -> sqlx::SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::new().filename(path).create_if_missing(true))
        .await
        .expect("Failed to open raw SQLite pool")
}

#[test_log::test(tokio::test)]
async fn test_foreign_table_layout_is_schema_error() {
    let env = TestEnv::new();
    let pool = raw_pool(&env.db_path).await;
    sqlx::query(
        "CREATE TABLE ticker_statistics (id INTEGER PRIMARY KEY, symbol TEXT, industry TEXT, pe_ratio REAL)",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let result = PipelineDatabase::open(&env.db_path).await;
    assert_matches!(result, Err(PipelineError::Schema(message)) if message.contains("ticker_statistics"));
}

#[test_log::test(tokio::test)]
async fn test_failing_aggregation_rolls_back_whole_batch() {
    let env = TestEnv::new();
    let at = Utc::now();

    let db = PipelineDatabase::open(&env.db_path).await.unwrap();
    db.upsert_industry_aggregations(&[aggregation(Industry::BanksDiversified, Some(12.0), 1, at)])
        .await
        .unwrap();
    let before = db.get_industry_aggregations().await.unwrap();
    db.close().await;

    let pool = raw_pool(&env.db_path).await;
    sqlx::query(
        r#"
        CREATE TRIGGER reject_consumer_electronics BEFORE INSERT ON industry_aggregation
        WHEN NEW.industry = 'Consumer Electronics'
        BEGIN
            SELECT RAISE(ABORT, 'rejected');
        END
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let db = PipelineDatabase::open(&env.db_path).await.unwrap();
    let batch = vec![
        aggregation(Industry::BanksDiversified, Some(99.0), 4, at),
        aggregation(Industry::SoftwareApplication, Some(20.0), 2, at),
        aggregation(Industry::ConsumerElectronics, Some(30.0), 1, at),
    ];
    let result = db.upsert_industry_aggregations(&batch).await;
    assert_matches!(result, Err(PipelineError::Storage(_)));

    let after = db.get_industry_aggregations().await.unwrap();
    assert_eq!(after, before);
    db.close().await;
}

#[test_log::test(tokio::test)]
async fn test_maintenance_open_requires_existing_database() {
    let env = TestEnv::new();
    let missing = env.dir.path().join("typo.db");

    let result = PipelineDatabase::open_existing(&missing).await;
    assert_matches!(result, Err(PipelineError::Storage(_)));
    assert!(!missing.exists());

    PipelineDatabase::open(&env.db_path).await.unwrap().close().await;
    let db = PipelineDatabase::open_existing(&env.db_path).await.unwrap();
    assert_eq!(db.summary(0).await.unwrap().ticker_count, 0);
    db.close().await;
}
