//! Top-N ranking - reduce the filtered data to chart series
//!
//! Groups the filtered daily trees by the stacking dimension, keeps the N
//! most expensive values and folds the rest into a synthetic "Other" series.
//!
//! Global invariants enforced:
//! - Ranking always runs on filtered data, never before filtering
//! - Deterministic ordering (total descending, then label ascending)
//! - Zero-cost values never appear, not even inside "Other"

use crate::filter::FilteredDailyAggregate;
use crate::record::{CurrencyMode, Dimension};
use crate::store::CostNode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Label of the remainder series
pub const OTHER_LABEL: &str = "Other";

/// Totals within this distance of zero count as zero
const ZERO_COST_EPSILON: f64 = 1e-9;

/// One stacked series: a label and one point per day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SeriesEntry {
    pub label: String,
    pub total: f64,
    pub points: Vec<f64>,
    /// Set on the synthetic remainder entry
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub is_other: bool,
}

/// Chart-ready series for one stacking dimension
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RankedSeries {
    pub stack_dimension: Dimension,
    pub currency: CurrencyMode,
    pub top_n: usize,
    pub dates: Vec<NaiveDate>,
    /// Ranked entries, followed by "Other" when anything was folded
    pub series: Vec<SeriesEntry>,
    /// Number of distinct non-zero values folded into "Other"
    pub folded: usize,
}

impl RankedSeries {
    /// Ranked entries without the remainder
    pub fn ranked(&self) -> impl Iterator<Item = &SeriesEntry> {
        self.series.iter().filter(|s| !s.is_other)
    }

    pub fn other(&self) -> Option<&SeriesEntry> {
        self.series.iter().find(|s| s.is_other)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.ranked().map(|s| s.label.as_str()).collect()
    }

    /// Sum of all series, ranked and folded
    pub fn total(&self) -> f64 {
        self.series.iter().map(|s| s.total).sum()
    }
}

/// Rank the filtered data by `stack_dimension`
///
/// `dates` is the chart's x-axis; data on days outside it is ignored.
pub fn rank(
    filtered: &FilteredDailyAggregate,
    dates: &[NaiveDate],
    stack_dimension: Dimension,
    top_n: usize,
    currency: CurrencyMode,
) -> RankedSeries {
    let mut points_by_label: HashMap<String, Vec<f64>> = HashMap::new();

    for (date, day) in &filtered.days {
        let Ok(position) = dates.binary_search(date) else {
            tracing::debug!(%date, "skipping day outside chart range");
            continue;
        };
        accumulate(
            day,
            0,
            stack_dimension.depth(),
            position,
            dates.len(),
            currency,
            &mut points_by_label,
        );
    }

    let mut entries: Vec<SeriesEntry> = points_by_label
        .into_iter()
        .map(|(label, points)| SeriesEntry {
            total: points.iter().sum(),
            label,
            points,
            is_other: false,
        })
        .filter(|entry| entry.total.abs() >= ZERO_COST_EPSILON)
        .collect();

    entries.sort_by(|a, b| {
        // 1. Total cost descending
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            // 2. Label ascending
            .then_with(|| a.label.cmp(&b.label))
    });

    let rest = if entries.len() > top_n {
        entries.split_off(top_n)
    } else {
        Vec::new()
    };
    let folded = rest.len();

    if !rest.is_empty() {
        let mut points = vec![0.0; dates.len()];
        for entry in &rest {
            for (sum, point) in points.iter_mut().zip(&entry.points) {
                *sum += point;
            }
        }
        entries.push(SeriesEntry {
            label: OTHER_LABEL.to_string(),
            total: rest.iter().map(|e| e.total).sum(),
            points,
            is_other: true,
        });
    }

    RankedSeries {
        stack_dimension,
        currency,
        top_n,
        dates: dates.to_vec(),
        series: entries,
        folded,
    }
}

/// Add every node at `target` depth below `node` into its label's series
fn accumulate(
    node: &CostNode,
    depth: usize,
    target: usize,
    position: usize,
    width: usize,
    currency: CurrencyMode,
    points_by_label: &mut HashMap<String, Vec<f64>>,
) {
    for (value, child) in &node.children {
        if depth == target {
            let points = points_by_label
                .entry(value.clone())
                .or_insert_with(|| vec![0.0; width]);
            points[position] += child.cost.amount(currency);
        } else {
            accumulate(
                child,
                depth + 1,
                target,
                position,
                width,
                currency,
                points_by_label,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::filter;
    use crate::record::RawCostRecord;
    use crate::selection::SelectionSets;
    use crate::store::CostStore;

    fn raw(date: &str, path: [&str; 5], cost: f64) -> RawCostRecord {
        RawCostRecord {
            date: Some(date.to_string()),
            subscription: Some(path[0].to_string()),
            category: Some(path[1].to_string()),
            subcategory: Some(path[2].to_string()),
            meter: Some(path[3].to_string()),
            resource: Some(path[4].to_string()),
            cost_local: Some(cost),
            cost_usd: Some(cost / 2.0),
            currency: None,
        }
    }

    fn ranked(records: &[RawCostRecord], stack: Dimension, top_n: usize) -> RankedSeries {
        let store = CostStore::from_raw(records);
        let filtered = filter(store.aggregate(), &SelectionSets::new());
        rank(&filtered, store.dates(), stack, top_n, CurrencyMode::Local)
    }

    #[test]
    fn test_top_n_with_other() {
        let records = vec![
            raw("2024-05-01", ["S", "Storage", "x", "m", "r"], 10.0),
            raw("2024-05-01", ["S", "Compute", "x", "m", "r"], 30.0),
            raw("2024-05-02", ["S", "Network", "x", "m", "r"], 5.0),
            raw("2024-05-02", ["S", "Backup", "x", "m", "r"], 2.0),
        ];
        let series = ranked(&records, Dimension::Category, 2);

        assert_eq!(series.labels(), vec!["Compute", "Storage"]);
        let other = series.other().unwrap();
        assert_eq!(other.label, OTHER_LABEL);
        assert_eq!(other.total, 7.0);
        assert_eq!(other.points, vec![0.0, 7.0]);
        assert_eq!(series.folded, 2);
        assert_eq!(series.total(), 47.0);
    }

    #[test]
    fn test_no_other_when_everything_fits() {
        let records = vec![
            raw("2024-05-01", ["S", "Storage", "x", "m", "r"], 10.0),
            raw("2024-05-01", ["S", "Compute", "x", "m", "r"], 30.0),
        ];
        let series = ranked(&records, Dimension::Category, 15);
        assert!(series.other().is_none());
        assert_eq!(series.series.len(), 2);
    }

    #[test]
    fn test_ties_break_by_label() {
        let records = vec![
            raw("2024-05-01", ["S", "b", "x", "m", "r"], 5.0),
            raw("2024-05-01", ["S", "c", "x", "m", "r"], 5.0),
            raw("2024-05-01", ["S", "a", "x", "m", "r"], 5.0),
        ];
        let series = ranked(&records, Dimension::Category, 2);
        assert_eq!(series.labels(), vec!["a", "b"]);
        assert_eq!(series.other().unwrap().total, 5.0);
    }

    #[test]
    fn test_zero_totals_are_dropped() {
        let records = vec![
            raw("2024-05-01", ["S", "C", "x", "free-meter", "r"], 0.0),
            raw("2024-05-01", ["S", "C", "x", "credit", "r"], 4.0),
            raw("2024-05-02", ["S", "C", "x", "credit", "r"], -4.0),
            raw("2024-05-01", ["S", "C", "x", "paid", "r"], 3.0),
        ];
        let series = ranked(&records, Dimension::Meter, 0);
        // Everything folds, but only the non-zero meter counts
        assert_eq!(series.folded, 1);
        assert_eq!(series.other().unwrap().total, 3.0);
    }

    #[test]
    fn test_groups_by_value_name_across_ancestors() {
        let records = vec![
            raw("2024-05-01", ["Sub-A", "Storage", "x", "m", "r"], 1.0),
            raw("2024-05-01", ["Sub-B", "Storage", "x", "m", "r"], 2.0),
        ];
        let series = ranked(&records, Dimension::Category, 5);
        assert_eq!(series.series.len(), 1);
        assert_eq!(series.series[0].total, 3.0);
    }

    #[test]
    fn test_usd_mode_uses_usd_column() {
        let store = CostStore::from_raw(&[raw("2024-05-01", ["S", "C", "x", "m", "r"], 10.0)]);
        let filtered = filter(store.aggregate(), &SelectionSets::new());
        let series = rank(&filtered, store.dates(), Dimension::Resource, 5, CurrencyMode::Usd);
        assert_eq!(series.series[0].total, 5.0);
        assert_eq!(series.currency, CurrencyMode::Usd);
    }
}
