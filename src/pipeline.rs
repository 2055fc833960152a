//! Orchestrator running fetch, transform and load in order.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::FiindoClient;
use crate::error::{PipelineError, Result};
use crate::fetcher::{run_fetch, FetchReport};
use crate::loader::{run_load, LoadReport};
use crate::models::Config;
use crate::snapshot::SnapshotStore;
use crate::transform::{run_transform, TransformReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Pull raw data from the API into a raw snapshot
    Fetch,
    /// Compute ticker statistics and industry aggregations
    Transform,
    /// Upsert the transformed snapshots into SQLite
    Load,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Fetch, Stage::Transform, Stage::Load];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Transform => "transform",
            Stage::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reports of every stage that ran.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub start_stage: Stage,
    pub fetch: Option<FetchReport>,
    pub transform: Option<TransformReport>,
    pub load: LoadReport,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl PipelineResult {
    pub fn duration_seconds(&self) -> i64 {
        self.end_time.signed_duration_since(self.start_time).num_seconds()
    }
}

/// Run the pipeline starting at `from`; earlier stages are skipped and their
/// latest snapshots consumed. The first failing stage aborts the run.
pub async fn run_pipeline(config: &Config, from: Stage, sample: usize) -> Result<PipelineResult> {
    let start_time = Utc::now();
    let store = SnapshotStore::new(&config.data_dir);

    info!("🚀 Starting pipeline from the {} stage", from);
    if from > Stage::Fetch {
        info!("⏭️  Skipping stages before {}, using latest snapshots", from);
    }

    let fetch = if from <= Stage::Fetch {
        Some(fetch_stage(config, &store).await.map_err(|e| fail(e, Stage::Fetch))?)
    } else {
        None
    };

    let transform = if from <= Stage::Transform {
        Some(run_transform(&store).map_err(|e| fail(e, Stage::Transform))?)
    } else {
        None
    };

    let load = run_load(&store, &config.database_path, sample)
        .await
        .map_err(|e| fail(e, Stage::Load))?;

    let result = PipelineResult {
        start_stage: from,
        fetch,
        transform,
        load,
        start_time,
        end_time: Utc::now(),
    };
    info!("🎉 Pipeline completed in {} seconds", result.duration_seconds());
    Ok(result)
}

async fn fetch_stage(config: &Config, store: &SnapshotStore) -> Result<FetchReport> {
    let client = FiindoClient::new(config)?;
    run_fetch(&client, store).await
}

fn fail(e: PipelineError, stage: Stage) -> PipelineError {
    error!("❌ {} stage failed: {}", stage, e);
    e.in_stage(stage)
}
