//! Timestamped, write-once JSON files that carry data between stages.
//!
//! File names follow `<tag>_<YYYYmmdd_HHMMSS>[_<n>].json`. Readers always pick
//! the lexicographically greatest name for a tag, which is also the newest.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

pub const RAW_TAG: &str = "financial_data";
pub const TICKER_STATISTICS_TAG: &str = "ticker_statistics";
pub const INDUSTRY_AGGREGATION_TAG: &str = "industry_aggregation";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const MAX_COLLISION_SUFFIX: u32 = 99;
const STAGING_PREFIX: &str = ".staging_";

/// Snapshot directory shared by all stages.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize `value` into a new snapshot for `tag`. Existing files are
    /// never overwritten; a same-second collision gets a numeric suffix.
    pub fn write<T: Serialize + ?Sized>(&self, tag: &str, at: DateTime<Utc>, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let body = serde_json::to_vec_pretty(value).map_err(|e| PipelineError::Snapshot {
            path: self.dir.join(tag),
            message: e.to_string(),
        })?;

        // Stage the body under a temporary name so a partial write never
        // becomes the latest snapshot.
        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.dir)?;
        staged.write_all(&body)?;
        staged.as_file().sync_all()?;

        let stamp = at.format(TIMESTAMP_FORMAT).to_string();
        for attempt in 0..=MAX_COLLISION_SUFFIX {
            let file_name = if attempt == 0 {
                format!("{}_{}.json", tag, stamp)
            } else {
                format!("{}_{}_{:02}.json", tag, stamp, attempt)
            };
            let path = self.dir.join(file_name);

            match staged.persist_noclobber(&path) {
                Ok(_) => {
                    info!("💾 Wrote snapshot {}", path.display());
                    return Ok(path);
                }
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    debug!("Snapshot {} already exists, trying next suffix", path.display());
                    staged = e.file;
                }
                Err(e) => return Err(e.error.into()),
            }
        }

        Err(PipelineError::Snapshot {
            path: self.dir.join(format!("{}_{}.json", tag, stamp)),
            message: "too many snapshots written within one second".to_string(),
        })
    }

    /// Path of the newest snapshot for `tag`.
    pub fn latest(&self, tag: &str) -> Result<PathBuf> {
        let missing = || PipelineError::MissingSnapshot {
            tag: tag.to_string(),
            dir: self.dir.clone(),
        };

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(missing()),
            Err(e) => return Err(e.into()),
        };

        let mut newest: Option<String> = None;
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_snapshot_name(tag, &name) {
                continue;
            }
            if newest.as_deref().map_or(true, |current| name.as_str() > current) {
                newest = Some(name);
            }
        }

        newest.map(|name| self.dir.join(name)).ok_or_else(missing)
    }

    /// Read and deserialize the newest snapshot for `tag`.
    pub fn read_latest<T: DeserializeOwned>(&self, tag: &str) -> Result<(PathBuf, T)> {
        let path = self.latest(tag)?;
        let value = read_json(&path)?;
        info!("📁 Loaded snapshot {}", path.display());
        Ok((path, value))
    }
}

/// Read a JSON document, mapping parse failures to `PipelineError::Snapshot`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read(path)?;
    serde_json::from_slice(&content).map_err(|e| PipelineError::Snapshot {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// `<tag>_<8 digits>_<6 digits>[_<digits>].json`
fn is_snapshot_name(tag: &str, name: &str) -> bool {
    let Some(rest) = name
        .strip_prefix(tag)
        .and_then(|r| r.strip_prefix('_'))
        .and_then(|r| r.strip_suffix(".json"))
    else {
        return false;
    };

    let mut parts = rest.split('_');
    let date_ok = parts.next().is_some_and(|p| p.len() == 8 && all_digits(p));
    let time_ok = parts.next().is_some_and(|p| p.len() == 6 && all_digits(p));
    let suffix_ok = match parts.next() {
        None => true,
        Some(p) => !p.is_empty() && all_digits(p),
    };
    date_ok && time_ok && suffix_ok && parts.next().is_none()
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}
