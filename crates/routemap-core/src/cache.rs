//! Incremental re-analysis: per-unit results cached by content hash.

use indexmap::IndexMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::AnalyzerConfig;
use crate::errors::{RouteMapError, RouteMapResult};
use crate::extract::{extract_unit, UnitAnalysis};
use crate::models::SourceUnit;
use crate::pipeline::{extract_all, resolve_analyses, Analysis, CancellationToken};

struct CacheEntry {
    content_hash: String,
    flag_ambiguous: bool,
    analysis: UnitAnalysis,
}

/// Cache of per-unit analyses keyed by unit identity.
///
/// An entry is reused only while the unit's SHA-256 content hash is unchanged.
/// The oldest insertion is evicted once `capacity` is exceeded.
pub struct UnitCache {
    capacity: usize,
    entries: Mutex<IndexMap<String, CacheEntry>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl UnitCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(config.unit_cache_capacity)
    }

    /// Cached analysis for `unit` if its content is unchanged.
    pub fn get(&self, unit: &SourceUnit, hash: &str, flag_ambiguous: bool) -> Option<UnitAnalysis> {
        let mut entries = self.entries.lock();
        let fresh = entries.get(&unit.identity).is_some_and(|entry| {
            entry.content_hash == hash && entry.flag_ambiguous == flag_ambiguous
        });
        if !fresh {
            return None;
        }
        // Move to end so recently used units survive eviction.
        let entry = entries.shift_remove(&unit.identity)?;
        let analysis = entry.analysis.clone();
        entries.insert(unit.identity.clone(), entry);
        Some(analysis)
    }

    pub fn insert(&self, unit: &SourceUnit, hash: String, flag_ambiguous: bool, analysis: UnitAnalysis) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        entries.shift_remove(&unit.identity);
        entries.insert(
            unit.identity.clone(),
            CacheEntry {
                content_hash: hash,
                flag_ambiguous,
                analysis,
            },
        );
        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    /// Drop entries for units no longer in the corpus.
    pub fn retain_units(&self, units: &[SourceUnit]) {
        let mut entries = self.entries.lock();
        entries.retain(|identity, _| units.iter().any(|u| u.identity == *identity));
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.lock().len(),
            capacity: self.capacity,
        }
    }
}

/// Analyze `units`, re-extracting only units whose content changed since the
/// last run, then resolve the whole corpus again.
pub fn analyze_incremental(
    cache: &UnitCache,
    units: &[SourceUnit],
    config: &AnalyzerConfig,
    cancel: Option<&CancellationToken>,
) -> RouteMapResult<Analysis> {
    let flag = config.flag_ambiguous_matches;
    let hashes: Vec<String> = units.par_iter().map(|u| content_hash(&u.text)).collect();

    let mut analyses: Vec<Option<UnitAnalysis>> = units
        .iter()
        .zip(&hashes)
        .map(|(unit, hash)| cache.get(unit, hash, flag))
        .collect();
    let stale: Vec<SourceUnit> = units
        .iter()
        .zip(&analyses)
        .filter(|(_, cached)| cached.is_none())
        .map(|(unit, _)| unit.clone())
        .collect();
    debug!(
        units = units.len(),
        reused = units.len() - stale.len(),
        stale = stale.len(),
        "incremental extraction"
    );

    let mut fresh = extract_all(&stale, config, cancel)?.into_iter();
    for (idx, slot) in analyses.iter_mut().enumerate() {
        if slot.is_some() {
            continue;
        }
        let analysis = match fresh.next() {
            Some(analysis) => analysis,
            None => extract_unit(&units[idx], flag),
        };
        cache.insert(&units[idx], hashes[idx].clone(), flag, analysis.clone());
        *slot = Some(analysis);
    }
    cache.retain_units(units);
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(RouteMapError::Cancelled);
    }

    let analyses: Vec<UnitAnalysis> = analyses.into_iter().flatten().collect();
    let analysis = resolve_analyses(&analyses)?;
    info!(
        units = units.len(),
        reextracted = stale.len(),
        endpoints = analysis.inventory.len(),
        "incremental analysis complete"
    );
    Ok(analysis)
}
