//! Fetch, transform and load pipeline for ticker fundamentals.
//!
//! Each stage communicates through timestamped JSON snapshots in the data
//! directory, so any stage can be re-run against the latest snapshot of the
//! stage before it.

pub mod api;
pub mod database;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod snapshot;
pub mod transform;

pub use error::{PipelineError, Result};
pub use models::Config;
pub use pipeline::{run_pipeline, Stage};
