//! costdrill core library - hierarchical cost drill-down and faceted filtering

#![deny(warnings)]

// Global invariants enforced in this crate:
// - The cost store is immutable once built
// - Facet values are identified by (dimension, value, ancestor path), never by name alone
// - Selection state changes only through a resolved cascade batch or a clear
// - Every gesture triggers exactly one filter pass and one ranking pass
// - No randomness, clocks, threads, or async
// - Identical input yields byte-for-byte identical output

pub mod cascade;
pub mod config;
pub mod explorer;
pub mod facet;
pub mod filter;
pub mod ranking;
pub mod record;
pub mod report;
pub mod selection;
pub mod store;

pub use config::ResolvedConfig;
pub use explorer::{CostExplorer, FilterSummary, ToggleOutcome, ViewSettings};
pub use facet::{FacetKey, HierarchyIndex};
pub use ranking::{RankedSeries, SeriesEntry};
pub use record::{CostRecord, CurrencyMode, Dimension, RawCostRecord};
pub use report::{render_json, render_text, ChartReport};
pub use selection::SelectionSets;
pub use store::CostStore;

use anyhow::{Context, Result};
use std::path::Path;

/// Load a cost-record file and build the store
///
/// Malformed records are excluded and reported through
/// [`CostStore::quality`]; only unreadable or unparseable files fail.
pub fn load_store(path: &Path) -> Result<CostStore> {
    let raw = record::load_records(path)?;
    let store = CostStore::from_raw(&raw);
    if store.records().is_empty() && !raw.is_empty() {
        tracing::warn!(path = %path.display(), "no valid cost records in input");
    }
    Ok(store)
}

/// Load a cost-record file and open an explorer with the given toggles applied
///
/// Each path in `selections` is one toggle gesture, applied in order. A path
/// that names no facet in the data is an error here, since it came from the
/// command line rather than from a live view.
pub fn explore(
    path: &Path,
    settings: ViewSettings,
    selections: &[FacetKey],
) -> Result<CostExplorer> {
    let store = load_store(path)
        .with_context(|| format!("failed to load cost data from {}", path.display()))?;
    let mut explorer = CostExplorer::new(store, settings);

    for key in selections {
        if explorer.toggle(key) == ToggleOutcome::NotFound {
            anyhow::bail!("facet not found in cost data: {}", key);
        }
    }

    Ok(explorer)
}
