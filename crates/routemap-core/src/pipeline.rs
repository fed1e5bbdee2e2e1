//! Analysis orchestration: per-unit extraction on a rayon pool, then a single
//! composition and inventory pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compose::compose;
use crate::config::AnalyzerConfig;
use crate::errors::{RouteMapError, RouteMapResult};
use crate::extract::{extract_unit, UnitAnalysis};
use crate::inventory::{self, Inventory};
use crate::models::{CompositionNode, Diagnostic, EndpointFragment, SourceUnit};

/// Result of a whole-corpus run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Analysis {
    pub inventory: Inventory,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run-wide cancellation flag shared with the workers.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Analyze a corpus with the default configuration.
pub fn analyze(units: &[SourceUnit]) -> RouteMapResult<Analysis> {
    analyze_with(units, &AnalyzerConfig::default(), None)
}

/// Analyze a corpus. A cancelled run yields `Err(Cancelled)` and nothing else.
pub fn analyze_with(
    units: &[SourceUnit],
    config: &AnalyzerConfig,
    cancel: Option<&CancellationToken>,
) -> RouteMapResult<Analysis> {
    let started = Instant::now();
    let analyses = extract_all(units, config, cancel)?;
    let analysis = resolve_analyses(&analyses)?;
    info!(
        units = units.len(),
        endpoints = analysis.inventory.len(),
        diagnostics = analysis.diagnostics.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "analysis complete"
    );
    Ok(analysis)
}

/// Per-unit stages for one unit, with the default configuration.
pub fn analyze_unit(unit: &SourceUnit) -> UnitAnalysis {
    extract_unit(unit, AnalyzerConfig::default().flag_ambiguous_matches)
}

/// Compose previously extracted fragments and nodes into an inventory.
pub fn resolve(
    fragments: &[EndpointFragment],
    nodes: &[CompositionNode],
) -> RouteMapResult<Analysis> {
    let composition = compose(fragments, nodes);
    let mut diagnostics = composition.diagnostics;
    let inventory = inventory::build(composition.endpoints, &mut diagnostics)?;
    sort_diagnostics(&mut diagnostics);
    Ok(Analysis {
        inventory,
        diagnostics,
    })
}

/// Combine per-unit results, keeping their diagnostics alongside the composed ones.
pub(crate) fn resolve_analyses(analyses: &[UnitAnalysis]) -> RouteMapResult<Analysis> {
    let fragments: Vec<EndpointFragment> = analyses
        .iter()
        .flat_map(|a| a.fragments.iter().cloned())
        .collect();
    let nodes: Vec<CompositionNode> = analyses
        .iter()
        .flat_map(|a| a.nodes.iter().cloned())
        .collect();
    debug!(
        fragments = fragments.len(),
        nodes = nodes.len(),
        "resolving corpus"
    );
    let mut analysis = resolve(&fragments, &nodes)?;
    analysis
        .diagnostics
        .extend(analyses.iter().flat_map(|a| a.diagnostics.iter().cloned()));
    sort_diagnostics(&mut analysis.diagnostics);
    Ok(analysis)
}

pub(crate) fn extract_all(
    units: &[SourceUnit],
    config: &AnalyzerConfig,
    cancel: Option<&CancellationToken>,
) -> RouteMapResult<Vec<UnitAnalysis>> {
    if units.is_empty() {
        return Ok(Vec::new());
    }
    let flag = config.flag_ambiguous_matches;
    let worker = |unit: &SourceUnit| -> RouteMapResult<UnitAnalysis> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(RouteMapError::Cancelled);
        }
        Ok(extract_unit(unit, flag))
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build();

    let results: RouteMapResult<Vec<UnitAnalysis>> = match pool {
        Ok(pool) => pool.install(|| units.par_iter().map(worker).collect()),
        Err(e) => {
            warn!(error = %e, "thread pool unavailable, extracting sequentially");
            units.iter().map(worker).collect()
        }
    };
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(RouteMapError::Cancelled);
    }
    results
}

/// Diagnostics are reported in location order; ties keep their stage order.
fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| a.location.cmp(&b.location));
}
