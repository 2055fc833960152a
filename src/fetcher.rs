//! Fetch stage: collect raw financial data for the target industries and
//! write it as a raw snapshot.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::api::TickerDataProvider;
use crate::error::{PipelineError, Result};
use crate::models::{CollectionSummary, Industry, KnownSymbols, RawTickerRecord, Statement, SymbolProfile};
use crate::snapshot::{SnapshotStore, RAW_TAG};

pub const KNOWN_SYMBOLS_FILE: &str = "known_symbols.json";
pub const COLLECTION_SUMMARY_FILE: &str = "collection_summary.json";

/// A symbol is kept when at least this many of its four endpoints answer.
pub const MIN_SUCCESSFUL_ENDPOINTS: usize = 2;
const ENDPOINTS_PER_SYMBOL: usize = 1 + Statement::ALL.len();

/// Local cache of symbol profiles so `general` is queried once per symbol.
pub struct KnownSymbolsCache {
    path: PathBuf,
    symbols: KnownSymbols,
    dirty: bool,
}

impl KnownSymbolsCache {
    /// Load the cache from `dir`; a missing or unreadable file starts empty.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(KNOWN_SYMBOLS_FILE);
        let symbols = match fs::read(&path) {
            Ok(content) => serde_json::from_slice(&content).unwrap_or_else(|e| {
                warn!("⚠️  Could not parse {}, starting with an empty cache: {}", path.display(), e);
                KnownSymbols::new()
            }),
            Err(_) => KnownSymbols::new(),
        };
        info!("📂 Loaded {} known symbols from {}", symbols.len(), path.display());

        Self { path, symbols, dirty: false }
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolProfile> {
        self.symbols.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Insert or replace a profile; returns whether anything changed. Callers
    /// save after every change so an aborted run keeps its progress.
    pub fn update(&mut self, symbol: &str, profile: SymbolProfile) -> bool {
        if self.symbols.get(symbol) == Some(&profile) {
            return false;
        }
        self.symbols.insert(symbol.to_string(), profile);
        self.dirty = true;
        true
    }

    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.symbols).map_err(|e| PipelineError::Snapshot {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&self.path, content)?;
        self.dirty = false;
        debug!("Known symbols saved to {}", self.path.display());
        Ok(())
    }
}

/// Counters collected while fetching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchStats {
    pub total_symbols: usize,
    pub new_profiles: usize,
    pub filtered_symbols: usize,
    pub collected_symbols: usize,
    pub skipped_symbols: usize,
}

/// Outcome of one fetch run.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub snapshot: PathBuf,
    pub records: Vec<RawTickerRecord>,
    pub stats: FetchStats,
    pub summary: CollectionSummary,
}

/// Authentication failures abort the stage; anything else is reported to the caller to skip.
fn abort_on_auth<T>(result: Result<T>) -> Result<Result<T>> {
    match result {
        Err(e @ PipelineError::Authentication(_)) => Err(e),
        other => Ok(other),
    }
}

/// Collect raw records for every symbol in an allow-listed industry.
pub async fn fetch_records<P>(provider: &P, cache: &mut KnownSymbolsCache) -> Result<(Vec<RawTickerRecord>, FetchStats)>
where
    P: TickerDataProvider + ?Sized,
{
    let mut stats = FetchStats::default();

    info!("📊 Fetching all symbols from API...");
    let symbols = provider.get_symbols().await?;
    stats.total_symbols = symbols.len();
    info!("Found {} total symbols in API", symbols.len());

    info!("🔍 Filtering symbols for target industries...");
    let mut targets: Vec<(String, SymbolProfile, Industry)> = Vec::new();
    for symbol in &symbols {
        let profile = match cache.get(symbol) {
            Some(profile) => profile.clone(),
            None => match abort_on_auth(provider.get_profile(symbol).await)? {
                Ok(profile) => {
                    if cache.update(symbol, profile.clone()) {
                        cache.save()?;
                    }
                    stats.new_profiles += 1;
                    profile
                }
                Err(e) => {
                    warn!("❌ {}: could not load profile: {}", symbol, e);
                    continue;
                }
            },
        };

        match Industry::parse(&profile.industry) {
            Some(industry) => {
                debug!("✅ {} ({})", symbol, industry);
                targets.push((symbol.clone(), profile, industry));
            }
            None => debug!("{} ({} - not target)", symbol, profile.industry),
        }
    }
    stats.filtered_symbols = targets.len();
    info!("Filtered {} symbols in target industries", targets.len());

    let mut records = Vec::with_capacity(targets.len());
    for (i, (symbol, profile, industry)) in targets.iter().enumerate() {
        info!("[{}/{}] 📈 Processing {} ({})", i + 1, targets.len(), symbol, industry);
        let mut record = RawTickerRecord::new(symbol, profile);
        let mut successes = 0;

        match abort_on_auth(provider.get_eod(symbol).await)? {
            Ok(eod) => {
                record.eod = Some(eod);
                successes += 1;
            }
            Err(e) => warn!("  • {} eod: {}", symbol, e),
        }

        for statement in Statement::ALL {
            match abort_on_auth(provider.get_statement(symbol, statement).await)? {
                Ok(payload) => {
                    record.set_statement(statement, payload);
                    successes += 1;
                }
                Err(e) => warn!("  • {} {}: {}", symbol, statement.as_str(), e),
            }
        }

        if successes >= MIN_SUCCESSFUL_ENDPOINTS {
            debug!("Added {} ({}/{} endpoints)", symbol, successes, ENDPOINTS_PER_SYMBOL);
            records.push(record);
        } else {
            warn!(
                "Skipping {}: only {}/{} endpoints succeeded",
                symbol, successes, ENDPOINTS_PER_SYMBOL
            );
            stats.skipped_symbols += 1;
        }
    }
    stats.collected_symbols = records.len();

    Ok((records, stats))
}

/// Run the fetch stage and write the raw snapshot plus a collection summary.
pub async fn run_fetch<P>(provider: &P, store: &SnapshotStore) -> Result<FetchReport>
where
    P: TickerDataProvider + ?Sized,
{
    info!("🚀 Starting fetch stage");
    let mut cache = KnownSymbolsCache::load(store.dir());
    let (records, stats) = fetch_records(provider, &mut cache).await?;

    if records.is_empty() {
        warn!("No data collected; writing an empty snapshot");
    }

    let at = Utc::now();
    let snapshot = store.write(RAW_TAG, at, &records)?;

    let mut symbols_by_industry: BTreeMap<String, usize> =
        Industry::ALL.iter().map(|i| (i.to_string(), 0)).collect();
    for record in &records {
        if let Some(industry) = Industry::parse(&record.industry) {
            *symbols_by_industry.entry(industry.to_string()).or_default() += 1;
        }
    }

    let summary = CollectionSummary {
        total_symbols_from_api: stats.total_symbols,
        filtered_symbols: stats.filtered_symbols,
        collected_symbols: stats.collected_symbols,
        known_symbols_count: cache.len(),
        symbols_by_industry,
        collection_date: at,
        data_file: snapshot
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let summary_path = store.dir().join(COLLECTION_SUMMARY_FILE);
    let content = serde_json::to_string_pretty(&summary).map_err(|e| PipelineError::Snapshot {
        path: summary_path.clone(),
        message: e.to_string(),
    })?;
    fs::write(&summary_path, content)?;

    info!(
        "✅ Fetch completed: {} of {} target symbols collected",
        stats.collected_symbols, stats.filtered_symbols
    );

    Ok(FetchReport {
        snapshot,
        records,
        stats,
        summary,
    })
}
