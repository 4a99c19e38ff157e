//! Cost record store - the immutable daily dataset
//!
//! Rolls validated records up into one hierarchy tree per day. Every node keeps
//! its own total and its breakdown by the next level down, so the hierarchy can
//! be re-walked top-down without rescanning records.
//!
//! Global invariants enforced:
//! - Built once per dataset, read-only afterward
//! - Malformed records never enter the tree; they are counted instead
//! - Deterministic ordering (BTreeMap keyed by date and value name)

use crate::facet::HierarchyIndex;
use crate::record::{Cost, CostRecord, Dimension, RawCostRecord, RecordIssue};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum number of offending record positions kept per issue
const MAX_ISSUE_SAMPLES: usize = 5;

/// Longest first-to-last span filled in day by day (about ten years)
pub const MAX_DATE_AXIS_DAYS: i64 = 3660;

/// One node of a day's cost hierarchy
///
/// The root node of a day has subscriptions as children; resource nodes are
/// leaves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CostNode {
    pub cost: Cost,
    pub record_count: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub children: BTreeMap<String, CostNode>,
}

impl CostNode {
    /// Add a record's cost along its full path, updating every level it passes
    fn insert(&mut self, path: &[String], cost: Cost) {
        self.cost += cost;
        self.record_count += 1;
        if let Some((head, rest)) = path.split_first() {
            self.children
                .entry(head.clone())
                .or_default()
                .insert(rest, cost);
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Follow a value path down from this node
    pub fn descend(&self, path: &[String]) -> Option<&CostNode> {
        path.iter()
            .try_fold(self, |node, value| node.children.get(value))
    }
}

/// Per-day hierarchy trees
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DailyAggregate {
    pub days: BTreeMap<NaiveDate, CostNode>,
}

impl DailyAggregate {
    /// Roll validated records up into per-day trees
    pub fn from_records(records: &[CostRecord]) -> Self {
        let mut days: BTreeMap<NaiveDate, CostNode> = BTreeMap::new();
        for record in records {
            days.entry(record.date)
                .or_default()
                .insert(&record.path, record.cost);
        }
        DailyAggregate { days }
    }

    pub fn day(&self, date: NaiveDate) -> Option<&CostNode> {
        self.days.get(&date)
    }

    /// Total cost of one day (zero when the day has no data)
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

    pub fn record_count(&self) -> usize {
        self.days.values().map(|n| n.record_count).sum()
    }
}

/// Counts of records excluded during store construction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DataQualityReport {
    pub total_records: usize,
    pub excluded_records: usize,
    /// Issue description -> count
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub issues: BTreeMap<String, usize>,
    /// Positions (in input order) of the first few excluded records
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub samples: Vec<usize>,
    /// Local currency codes seen across valid records
    pub currencies: BTreeSet<String>,
    /// Record dates spanned too long a range; the axis only has days with data
    #[serde(default)]
    pub sparse_date_axis: bool,
}

impl DataQualityReport {
    fn record_issue(&mut self, position: usize, issue: RecordIssue) {
        self.excluded_records += 1;
        *self.issues.entry(issue.to_string()).or_insert(0) += 1;
        if self.samples.len() < MAX_ISSUE_SAMPLES {
            self.samples.push(position);
        }
    }

    pub fn has_warnings(&self) -> bool {
        self.excluded_records > 0
    }

    /// Local costs are only summable when one currency is in play
    pub fn has_mixed_currencies(&self) -> bool {
        self.currencies.len() > 1
    }
}

/// The loaded dataset: records, their daily rollup and the hierarchy index
#[derive(Debug, Clone)]
pub struct CostStore {
    records: Vec<CostRecord>,
    aggregate: DailyAggregate,
    index: HierarchyIndex,
    quality: DataQualityReport,
    dates: Vec<NaiveDate>,
}

impl CostStore {
    /// Validate raw records and build the store
    ///
    /// Malformed records are dropped and counted in the data-quality report;
    /// construction itself never fails.
    pub fn from_raw(raw: &[RawCostRecord]) -> Self {
        let mut quality = DataQualityReport {
            total_records: raw.len(),
            ..DataQualityReport::default()
        };
        let mut records = Vec::with_capacity(raw.len());

        for (position, raw_record) in raw.iter().enumerate() {
            match raw_record.validate() {
                Ok(record) => records.push(record),
                Err(issue) => quality.record_issue(position, issue),
            }
        }

        if quality.has_warnings() {
            tracing::warn!(
                excluded = quality.excluded_records,
                total = quality.total_records,
                issues = ?quality.issues,
                "excluded malformed cost records"
            );
        }

        Self::build(records, quality)
    }

    /// Build a store from already-validated records
    pub fn from_records(records: Vec<CostRecord>) -> Self {
        let quality = DataQualityReport {
            total_records: records.len(),
            ..DataQualityReport::default()
        };
        Self::build(records, quality)
    }

    fn build(records: Vec<CostRecord>, mut quality: DataQualityReport) -> Self {
        quality.currencies = records.iter().map(|r| r.currency.clone()).collect();
        let aggregate = DailyAggregate::from_records(&records);
        let index = HierarchyIndex::from_aggregate(&aggregate);
        let dates = date_axis(&aggregate, &mut quality);

        tracing::debug!(
            records = records.len(),
            days = dates.len(),
            facets = index.len(),
            "built cost store"
        );

        CostStore {
            records,
            aggregate,
            index,
            quality,
            dates,
        }
    }

    pub fn records(&self) -> &[CostRecord] {
        &self.records
    }

    pub fn aggregate(&self) -> &DailyAggregate {
        &self.aggregate
    }

    pub fn index(&self) -> &HierarchyIndex {
        &self.index
    }

    pub fn quality(&self) -> &DataQualityReport {
        &self.quality
    }

    /// Every calendar day from the first to the last record date
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Distinct values of a dimension, regardless of ancestors
    pub fn distinct_values(&self, dimension: Dimension) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.value(dimension)).collect()
    }
}

/// Contiguous day range covering the aggregate, so chart x-axes have no gaps
///
/// A span longer than `MAX_DATE_AXIS_DAYS` (usually one mistyped year) falls
/// back to the days that have data, flagged in the quality report.
fn date_axis(aggregate: &DailyAggregate, quality: &mut DataQualityReport) -> Vec<NaiveDate> {
    let (Some(first), Some(last)) = (
        aggregate.days.keys().next().copied(),
        aggregate.days.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    let span = (last - first).num_days() + 1;
    if span > MAX_DATE_AXIS_DAYS {
        tracing::warn!(
            first = %first,
            last = %last,
            span_days = span,
            "record dates span too long a range; charting only days with data"
        );
        quality.sparse_date_axis = true;
        return aggregate.days.keys().copied().collect();
    }
    first.iter_days().take_while(|d| *d <= last).collect()
}
