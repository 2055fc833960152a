use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::Stage;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors surfaced by the pipeline stages.
///
/// Malformed fields inside a raw record are never reported here: they degrade
/// to `None` metrics during the transform.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("No '{tag}' snapshot found in {}", dir.display())]
    MissingSnapshot { tag: String, dir: PathBuf },

    #[error("Invalid snapshot {}: {message}", path.display())]
    Snapshot { path: PathBuf, message: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Attach the name of the stage that produced this error.
    pub fn in_stage(self, stage: Stage) -> Self {
        PipelineError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping stage wrappers.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Network(e.to_string())
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Storage(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for PipelineError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        PipelineError::Schema(e.to_string())
    }
}
