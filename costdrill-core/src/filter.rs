//! Faceted filter evaluator
//!
//! Produces the filtered daily hierarchy for the current selection.
//!
//! Global invariants enforced:
//! - Each dimension's test is evaluated on its own, then all five are conjoined
//! - An unconstrained dimension admits everything; its emptiness never leaks
//!   into another dimension's test
//! - Rollups are rebuilt from surviving leaves, never rescaled
//! - Output is derived and never mutated after construction

use crate::record::{Cost, Dimension};
use crate::selection::SelectionSets;
use crate::store::{CostNode, DailyAggregate};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Daily trees restricted to records that pass every dimension test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FilteredDailyAggregate {
    pub days: BTreeMap<NaiveDate, CostNode>,
    pub matched_records: usize,
}

impl FilteredDailyAggregate {
    pub fn day_total(&self, date: NaiveDate) -> Cost {
        self.days.get(&date).map(|n| n.cost).unwrap_or_default()
    }

    pub fn total(&self) -> Cost {
        let mut total = Cost::default();
        for node in self.days.values() {
            total += node.cost;
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.matched_records == 0
    }
}

/// Filter the aggregate down to what the selection admits
pub fn filter(aggregate: &DailyAggregate, selection: &SelectionSets) -> FilteredDailyAggregate {
    if selection.is_empty() {
        return FilteredDailyAggregate {
            days: aggregate.days.clone(),
            matched_records: aggregate.record_count(),
        };
    }

    let mut days = BTreeMap::new();
    let mut matched_records = 0;
    let mut path: Vec<String> = Vec::with_capacity(Dimension::ALL.len());

    for (date, day) in &aggregate.days {
        if let Some(node) = filter_children(day, 0, &mut path, selection) {
            matched_records += node.record_count;
            days.insert(*date, node);
        }
    }

    tracing::debug!(
        days = days.len(),
        matched_records,
        "filtered daily aggregate"
    );

    FilteredDailyAggregate {
        days,
        matched_records,
    }
}

/// Rebuild `node` keeping only children (at `depth`) that pass their
/// dimension test and still have surviving leaves
///
/// `path` holds the ancestor values of the children being tested.
fn filter_children(
    node: &CostNode,
    depth: usize,
    path: &mut Vec<String>,
    selection: &SelectionSets,
) -> Option<CostNode> {
    let Some(dimension) = Dimension::from_depth(depth) else {
        // Below resources: a leaf, kept as-is
        return Some(node.clone());
    };

    let mut kept = CostNode::default();
    for (value, child) in &node.children {
        if !selection.admits(dimension, value, path) {
            continue;
        }
        path.push(value.clone());
        let filtered = filter_children(child, depth + 1, path, selection);
        path.pop();

        if let Some(filtered) = filtered {
            kept.cost += filtered.cost;
            kept.record_count += filtered.record_count;
            kept.children.insert(value.clone(), filtered);
        }
    }

    (kept.record_count > 0).then_some(kept)
}
