//! Cost explorer - the one place user gestures enter the engine
//!
//! Each gesture is handled to completion: the selection is changed by one
//! resolved batch, then the filter and the ranker run once. Controls that only
//! affect presentation (stacking dimension, top N, currency) rerun the ranker
//! alone.
//!
//! Global invariants enforced:
//! - One gesture, one selection transition, one recompute
//! - The selection is written only through resolved cascades or `clear`
//! - Views are rebuilt from scratch, never patched

use crate::facet::FacetKey;
use crate::filter::{filter, FilteredDailyAggregate};
use crate::ranking::{rank, RankedSeries};
use crate::record::{CurrencyMode, Dimension};
use crate::selection::{SelectionChange, SelectionSets, SelectionState};
use crate::store::{CostStore, DataQualityReport};
use serde::{Deserialize, Serialize};

/// Default number of ranked series
pub const DEFAULT_TOP_N: usize = 15;

/// Presentation controls for the ranked series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ViewSettings {
    pub stack_by: Dimension,
    pub top_n: usize,
    pub currency: CurrencyMode,
}

impl Default for ViewSettings {
    fn default() -> Self {
        ViewSettings {
            stack_by: Dimension::Category,
            top_n: DEFAULT_TOP_N,
            currency: CurrencyMode::Local,
        }
    }
}

/// How many times each stage has run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RecomputeStats {
    /// Incremented once per applied selection transition
    pub selection_revision: u64,
    pub filter_passes: u64,
    pub rank_passes: u64,
}

/// Result of a toggle gesture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Applied(SelectionChange),
    /// The key is not in the hierarchy; nothing changed
    NotFound,
}

/// Summary driving the "clear filters" control and the result count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FilterSummary {
    pub filters_active: bool,
    pub selected_facets: usize,
    pub matched_records: usize,
    pub total_records: usize,
    pub excluded_records: usize,
    pub stack_dimension: Dimension,
    pub currency: CurrencyMode,
}

/// Interactive session over one static dataset
#[derive(Debug, Clone)]
pub struct CostExplorer {
    store: CostStore,
    selection: SelectionState,
    settings: ViewSettings,
    filtered: FilteredDailyAggregate,
    series: RankedSeries,
    stats: RecomputeStats,
}

impl CostExplorer {
    pub fn new(store: CostStore, settings: ViewSettings) -> Self {
        let selection = SelectionState::new();
        let filtered = filter(store.aggregate(), selection.sets());
        let series = rank_view(&store, &filtered, &settings);
        warn_on_mixed_currency(store.quality(), settings.currency);

        CostExplorer {
            store,
            selection,
            settings,
            filtered,
            series,
            stats: RecomputeStats {
                selection_revision: 0,
                filter_passes: 1,
                rank_passes: 1,
            },
        }
    }

    /// Toggle one facet value, cascading to its descendants
    pub fn toggle(&mut self, key: &FacetKey) -> ToggleOutcome {
        match self.selection.toggle(self.store.index(), key) {
            Some(change) => {
                self.stats.selection_revision += 1;
                self.refilter();
                ToggleOutcome::Applied(change)
            }
            None => ToggleOutcome::NotFound,
        }
    }

    /// Drop every selection; returns whether anything changed
    pub fn clear(&mut self) -> bool {
        if !self.selection.clear() {
            return false;
        }
        self.stats.selection_revision += 1;
        self.refilter();
        true
    }

    pub fn set_stack_dimension(&mut self, stack_by: Dimension) {
        if self.settings.stack_by != stack_by {
            self.settings.stack_by = stack_by;
            self.rerank();
        }
    }

    pub fn set_top_n(&mut self, top_n: usize) {
        if self.settings.top_n != top_n {
            self.settings.top_n = top_n;
            self.rerank();
        }
    }

    pub fn set_currency(&mut self, currency: CurrencyMode) {
        if self.settings.currency != currency {
            self.settings.currency = currency;
            warn_on_mixed_currency(self.store.quality(), currency);
            self.rerank();
        }
    }

    pub fn store(&self) -> &CostStore {
        &self.store
    }

    pub fn selection(&self) -> &SelectionSets {
        self.selection.sets()
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    pub fn filtered(&self) -> &FilteredDailyAggregate {
        &self.filtered
    }

    pub fn series(&self) -> &RankedSeries {
        &self.series
    }

    pub fn stats(&self) -> RecomputeStats {
        self.stats
    }

    pub fn summary(&self) -> FilterSummary {
        let quality = self.store.quality();
        let sets = self.selection.sets();
        FilterSummary {
            filters_active: !sets.is_empty(),
            selected_facets: sets.len(),
            matched_records: self.filtered.matched_records,
            total_records: quality.total_records,
            excluded_records: quality.excluded_records,
            stack_dimension: self.settings.stack_by,
            currency: self.settings.currency,
        }
    }

    fn refilter(&mut self) {
        self.filtered = filter(self.store.aggregate(), self.selection.sets());
        self.stats.filter_passes += 1;
        self.rerank();
    }

    fn rerank(&mut self) {
        self.series = rank_view(&self.store, &self.filtered, &self.settings);
        self.stats.rank_passes += 1;
        tracing::debug!(
            stack_by = %self.settings.stack_by,
            series = self.series.series.len(),
            matched_records = self.filtered.matched_records,
            "recomputed cost series"
        );
    }
}

fn rank_view(
    store: &CostStore,
    filtered: &FilteredDailyAggregate,
    settings: &ViewSettings,
) -> RankedSeries {
    rank(
        filtered,
        store.dates(),
        settings.stack_by,
        settings.top_n,
        settings.currency,
    )
}

fn warn_on_mixed_currency(quality: &DataQualityReport, currency: CurrencyMode) {
    if currency == CurrencyMode::Local && quality.has_mixed_currencies() {
        tracing::warn!(
            currencies = ?quality.currencies,
            "summing local costs across several currencies; use USD for comparable totals"
        );
    }
}
