//! Reporting and output generation
//!
//! Global invariants enforced:
//! - Deterministic output ordering
//! - Byte-for-byte identical output across runs

use crate::explorer::{CostExplorer, FilterSummary};
use crate::facet::FacetKey;
use crate::ranking::RankedSeries;
use crate::record::{Cost, CurrencyMode, Dimension};
use crate::store::{CostStore, DataQualityReport, MAX_DATE_AXIS_DAYS};
use serde::{Deserialize, Serialize};

/// Everything a chart needs for one render
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ChartReport {
    pub summary: FilterSummary,
    /// Selected facet keys, rendered as paths
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub selected: Vec<String>,
    pub quality: DataQualityReport,
    pub chart: RankedSeries,
}

impl ChartReport {
    pub fn from_explorer(explorer: &CostExplorer) -> Self {
        ChartReport {
            summary: explorer.summary(),
            selected: explorer
                .selection()
                .keys()
                .iter()
                .map(FacetKey::to_string)
                .collect(),
            quality: explorer.store().quality().clone(),
            chart: explorer.series().clone(),
        }
    }
}

/// One facet value with its cost over the whole date range
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct FacetEntry {
    pub path: String,
    pub dimension: Dimension,
    pub value: String,
    pub cost: Cost,
    pub children: usize,
}

/// List every facet key of a dimension, in hierarchy order
pub fn facet_listing(store: &CostStore, dimension: Dimension) -> Vec<FacetEntry> {
    let index = store.index();
    let mut keys = index.keys(dimension);
    keys.sort_by_key(|key| key.path());
    keys
        .into_iter()
        .map(|key| {
            let path = key.path();
            let mut cost = Cost::default();
            for day in store.aggregate().days.values() {
                if let Some(node) = day.descend(&path) {
                    cost += node.cost;
                }
            }
            FacetEntry {
                path: key.to_string(),
                dimension,
                value: key.value.clone(),
                cost,
                children: index.children(key).map_or(0, <[FacetKey]>::len),
            }
        })
        .collect()
}

/// Render the ranked series as a text table plus summary lines
pub fn render_text(report: &ChartReport) -> String {
    let mut output = String::new();
    let chart = &report.chart;
    let grand_total = chart.total();

    output.push_str(&format!(
        "{:<6} {:<40} {:>14} {:>7}\n",
        "RANK",
        chart.stack_dimension.as_str().to_uppercase(),
        format!("TOTAL ({})", chart.currency.as_str().to_uppercase()),
        "SHARE"
    ));

    for (position, entry) in chart.series.iter().enumerate() {
        let rank = if entry.is_other {
            "-".to_string()
        } else {
            (position + 1).to_string()
        };
        let label = if entry.is_other {
            format!("{} ({} more)", entry.label, chart.folded)
        } else {
            entry.label.clone()
        };
        output.push_str(&format!(
            "{:<6} {:<40} {:>14.2} {:>6.1}%\n",
            rank,
            truncate_or_pad(&label, 40),
            entry.total,
            share(entry.total, grand_total),
        ));
    }

    if chart.series.is_empty() {
        output.push_str("(no cost data matches the current selection)\n");
    }

    let summary = &report.summary;
    output.push('\n');
    if let (Some(first), Some(last)) = (chart.dates.first(), chart.dates.last()) {
        output.push_str(&format!(
            "Range: {} to {} ({} days)\n",
            first,
            last,
            chart.dates.len()
        ));
    }
    output.push_str(&format!("Total: {:.2}\n", grand_total));
    output.push_str(&format!(
        "Records: {} of {} matched\n",
        summary.matched_records,
        summary.total_records - summary.excluded_records
    ));
    if summary.filters_active {
        output.push_str(&format!(
            "Filters: {} facet keys selected\n",
            summary.selected_facets
        ));
        for path in &report.selected {
            output.push_str(&format!("  {}\n", path));
        }
    } else {
        output.push_str("Filters: none\n");
    }

    let quality = &report.quality;
    if quality.has_warnings() {
        output.push_str(&format!(
            "Warning: {} malformed records excluded\n",
            quality.excluded_records
        ));
        for (issue, count) in &quality.issues {
            output.push_str(&format!("  {}: {}\n", issue, count));
        }
    }
    if summary.currency == CurrencyMode::Local && quality.has_mixed_currencies() {
        let codes: Vec<&str> = quality.currencies.iter().map(String::as_str).collect();
        output.push_str(&format!(
            "Warning: local totals mix currencies ({})\n",
            codes.join(", ")
        ));
    }
    if quality.sparse_date_axis {
        output.push_str(&format!(
            "Warning: dates span more than {} days; only days with data are charted\n",
            MAX_DATE_AXIS_DAYS
        ));
    }

    output
}

/// Render the chart report as JSON output
pub fn render_json(report: &ChartReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

/// Render a facet listing as a text table
pub fn render_facets_text(entries: &[FacetEntry], currency: CurrencyMode) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<60} {:>14} {:>9}\n",
        "FACET",
        format!("TOTAL ({})", currency.as_str().to_uppercase()),
        "CHILDREN"
    ));
    for entry in entries {
        output.push_str(&format!(
            "{:<60} {:>14.2} {:>9}\n",
            truncate_or_pad(&entry.path, 60),
            entry.cost.amount(currency),
            entry.children
        ));
    }
    output
}

/// Render a facet listing as JSON output
pub fn render_facets_json(entries: &[FacetEntry]) -> String {
    serde_json::to_string_pretty(entries).unwrap_or_else(|_| "[]".to_string())
}

fn share(amount: f64, total: f64) -> f64 {
    if total.abs() < f64::EPSILON {
        0.0
    } else {
        amount / total * 100.0
    }
}

/// Truncate or pad string to fixed width
fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{:<width$}", s, width = width)
    }
}
