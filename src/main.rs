use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use ticker_pipeline::api::FiindoClient;
use ticker_pipeline::database::PipelineDatabase;
use ticker_pipeline::fetcher::run_fetch;
use ticker_pipeline::loader::{run_load, DEFAULT_SAMPLE_SIZE};
use ticker_pipeline::snapshot::SnapshotStore;
use ticker_pipeline::transform::run_transform;
use ticker_pipeline::{run_pipeline, Config, Stage};

#[derive(Parser)]
#[command(
    name = "ticker-pipeline",
    about = "📈 Ticker fundamentals pipeline",
    long_about = "Fetches financial data from the Fiindo API, computes per-ticker ratios and industry aggregations, and loads them into SQLite."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding snapshots and the known-symbols cache
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Show debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch raw data for the target industries
    Fetch,
    /// Compute statistics from the latest raw snapshot
    Transform,
    /// Load the latest transformed snapshots into the database
    Load {
        /// Number of sample rows to print
        #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
        sample: usize,
    },
    /// Run the whole pipeline
    Run {
        /// Stage to start from; earlier stages reuse their latest snapshots
        #[arg(long, value_enum, default_value_t = Stage::Fetch)]
        from: Stage,

        /// Number of sample rows to print
        #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
        sample: usize,
    },
    /// Show database contents and schema version
    Status {
        /// Number of sample rows to print
        #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
        sample: usize,
    },
    /// Back up the database, keeping the two newest copies
    Backup,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "ticker_pipeline=debug"
    } else {
        "ticker_pipeline=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(data_dir) = cli.data_dir {
        if cli.database.is_none() && std::env::var_os("DATABASE_PATH").is_none() {
            config.database_path = data_dir.join(ticker_pipeline::models::DEFAULT_DATABASE_FILE);
        }
        config.data_dir = data_dir;
    }
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    let store = SnapshotStore::new(&config.data_dir);

    match cli.command {
        Command::Fetch => {
            let client = FiindoClient::new(&config)?;
            let report = run_fetch(&client, &store).await?;
            println!("✅ Collected {} symbols", report.stats.collected_symbols);
            for (industry, count) in &report.summary.symbols_by_industry {
                println!("   {:<24} {}", industry, count);
            }
            println!("📁 Snapshot: {}", report.snapshot.display());
        }
        Command::Transform => {
            let report = run_transform(&store)?;
            println!(
                "✅ {} ticker statistics, {} industry aggregations",
                report.output.statistics.len(),
                report.output.aggregations.len()
            );
            println!("📁 {}", report.ticker_statistics_file.display());
            println!("📁 {}", report.industry_aggregation_file.display());
        }
        Command::Load { sample } => {
            let report = run_load(&store, &config.database_path, sample).await?;
            println!("{}", report);
        }
        Command::Run { from, sample } => {
            let result = run_pipeline(&config, from, sample).await?;
            println!("{}", result.load);
            println!("🎉 Pipeline completed in {} seconds", result.duration_seconds());
        }
        Command::Status { sample } => {
            let db = PipelineDatabase::open_existing(&config.database_path).await?;
            let summary = db.summary(sample).await?;
            let version = db.schema_version().await?;
            db.close().await;

            println!("🗄️  {}", config.database_path.display());
            match version {
                Some(version) => println!("   Schema version: {}", version),
                None => println!("   Schema version: none"),
            }
            println!("{}", summary);
        }
        Command::Backup => {
            let db = PipelineDatabase::open_existing(&config.database_path).await?;
            let path = db.backup().await?;
            db.close().await;
            println!("✅ Backup written to {}", path.display());
        }
    }

    Ok(())
}
