//! Cost records - the leaf observations everything else is derived from
//!
//! Records arrive from the collectors as loosely-typed JSON (`RawCostRecord`)
//! and are validated into `CostRecord` before they reach the store.
//!
//! Global invariants enforced:
//! - A validated record has a non-blank value for all five dimensions
//! - Costs are finite
//! - Records are never mutated after validation

use crate::facet::PATH_DELIMITER;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use std::path::Path;
use std::str::FromStr;

/// Currency assumed when a record carries no currency code
pub const DEFAULT_CURRENCY: &str = "USD";

/// One level of the cost hierarchy, outermost first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Subscription,
    Category,
    Subcategory,
    Meter,
    Resource,
}

impl Dimension {
    /// All dimensions in hierarchy order
    pub const ALL: [Dimension; 5] = [
        Dimension::Subscription,
        Dimension::Category,
        Dimension::Subcategory,
        Dimension::Meter,
        Dimension::Resource,
    ];

    /// Number of ancestors a value of this dimension has
    pub fn depth(self) -> usize {
        match self {
            Dimension::Subscription => 0,
            Dimension::Category => 1,
            Dimension::Subcategory => 2,
            Dimension::Meter => 3,
            Dimension::Resource => 4,
        }
    }

    pub fn from_depth(depth: usize) -> Option<Dimension> {
        Dimension::ALL.get(depth).copied()
    }

    /// The next level down, `None` for resources
    pub fn child(self) -> Option<Dimension> {
        Dimension::from_depth(self.depth() + 1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Subscription => "subscription",
            Dimension::Category => "category",
            Dimension::Subcategory => "subcategory",
            Dimension::Meter => "meter",
            Dimension::Resource => "resource",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subscription" => Ok(Dimension::Subscription),
            "category" => Ok(Dimension::Category),
            "subcategory" => Ok(Dimension::Subcategory),
            "meter" => Ok(Dimension::Meter),
            "resource" => Ok(Dimension::Resource),
            other => anyhow::bail!("unknown dimension: {}", other),
        }
    }
}

/// Which cost column the report sums
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyMode {
    /// Billing currency of each subscription
    #[default]
    Local,
    Usd,
}

impl CurrencyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CurrencyMode::Local => "local",
            CurrencyMode::Usd => "usd",
        }
    }
}

impl fmt::Display for CurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cost in both the local billing currency and USD
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub local: f64,
    pub usd: f64,
}

impl Cost {
    pub fn new(local: f64, usd: f64) -> Self {
        Cost { local, usd }
    }

    pub fn amount(&self, mode: CurrencyMode) -> f64 {
        match mode {
            CurrencyMode::Local => self.local,
            CurrencyMode::Usd => self.usd,
        }
    }
}

impl AddAssign for Cost {
    fn add_assign(&mut self, rhs: Cost) {
        self.local += rhs.local;
        self.usd += rhs.usd;
    }
}

/// Why a raw record was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
pub enum RecordIssue {
    #[error("missing {0} value")]
    MissingDimension(Dimension),
    #[error("{0} value contains control characters or '>'")]
    InvalidDimension(Dimension),
    #[error("missing or unparseable date")]
    InvalidDate,
    #[error("missing or non-finite cost")]
    InvalidCost,
}

/// A record as produced by the collectors, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCostRecord {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub meter: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default, alias = "cost_local")]
    pub cost_local: Option<f64>,
    #[serde(default, rename = "costUSD", alias = "costUsd", alias = "cost_usd")]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// A validated, immutable cost observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CostRecord {
    pub date: NaiveDate,
    /// Dimension values in hierarchy order
    pub path: [String; 5],
    pub cost: Cost,
    pub currency: String,
}

impl CostRecord {
    pub fn value(&self, dimension: Dimension) -> &str {
        &self.path[dimension.depth()]
    }

    pub fn subscription(&self) -> &str {
        self.value(Dimension::Subscription)
    }

    pub fn resource(&self) -> &str {
        self.value(Dimension::Resource)
    }
}

impl RawCostRecord {
    fn dimension_value(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Subscription => self.subscription.as_deref(),
            Dimension::Category => self.category.as_deref(),
            Dimension::Subcategory => self.subcategory.as_deref(),
            Dimension::Meter => self.meter.as_deref(),
            Dimension::Resource => self.resource.as_deref(),
        }
    }

    /// Validate into a `CostRecord`, reporting the first problem found
    pub fn validate(&self) -> Result<CostRecord, RecordIssue> {
        let mut path: [String; 5] = Default::default();
        for dimension in Dimension::ALL {
            let value = self
                .dimension_value(dimension)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or(RecordIssue::MissingDimension(dimension))?;
            if value
                .chars()
                .any(|c| c.is_control() || c == PATH_DELIMITER)
            {
                return Err(RecordIssue::InvalidDimension(dimension));
            }
            path[dimension.depth()] = value.to_string();
        }

        let date = self
            .date
            .as_deref()
            .and_then(parse_date)
            .ok_or(RecordIssue::InvalidDate)?;

        let local = self
            .cost_local
            .filter(|c| c.is_finite())
            .ok_or(RecordIssue::InvalidCost)?;
        let usd = self
            .cost_usd
            .filter(|c| c.is_finite())
            .ok_or(RecordIssue::InvalidCost)?;

        let currency = self
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_ascii_uppercase();

        Ok(CostRecord {
            date,
            path,
            cost: Cost::new(local, usd),
            currency,
        })
    }
}

/// Parse `YYYY-MM-DD`, or the date part of a timestamp such as
/// `2024-05-01T00:00:00Z`
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Load raw records from a `.json` array or a `.jsonl`/`.ndjson` file
pub fn load_records(path: &Path) -> Result<Vec<RawCostRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read cost records: {}", path.display()))?;

    let is_line_delimited = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("jsonl") | Some("ndjson")
    );

    if is_line_delimited {
        parse_jsonl(&content).with_context(|| format!("failed to parse {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse cost records: {}", path.display()))
    }
}

fn parse_jsonl(content: &str) -> Result<Vec<RawCostRecord>> {
    let mut records = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: RawCostRecord = serde_json::from_str(line)
            .with_context(|| format!("invalid record on line {}", line_no + 1))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(sub: &str, cat: &str) -> RawCostRecord {
        RawCostRecord {
            date: Some("2024-05-01".to_string()),
            subscription: Some(sub.to_string()),
            category: Some(cat.to_string()),
            subcategory: Some("Blob".to_string()),
            meter: Some("LRS Data Stored".to_string()),
            resource: Some("stlogs01".to_string()),
            cost_local: Some(9.5),
            cost_usd: Some(10.25),
            currency: Some("eur".to_string()),
        }
    }

    #[test]
    fn test_validate_complete_record() {
        let record = raw("Sub-A", "Storage").validate().unwrap();
        assert_eq!(record.subscription(), "Sub-A");
        assert_eq!(record.value(Dimension::Category), "Storage");
        assert_eq!(record.resource(), "stlogs01");
        assert_eq!(record.cost, Cost::new(9.5, 10.25));
        assert_eq!(record.currency, "EUR");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn test_validate_rejects_blank_dimension() {
        let mut record = raw("Sub-A", "   ");
        assert_eq!(
            record.validate(),
            Err(RecordIssue::MissingDimension(Dimension::Category))
        );
        record.category = None;
        assert_eq!(
            record.validate(),
            Err(RecordIssue::MissingDimension(Dimension::Category))
        );
    }

    #[test]
    fn test_validate_rejects_control_characters() {
        let record = raw("Sub\u{1f}A", "Storage");
        assert_eq!(
            record.validate(),
            Err(RecordIssue::InvalidDimension(Dimension::Subscription))
        );
    }

    #[test]
    fn test_validate_rejects_path_delimiter_in_values() {
        let record = raw("Sub-A", "Storage > Blob");
        let issue = record.validate().unwrap_err();
        assert_eq!(issue, RecordIssue::InvalidDimension(Dimension::Category));
        assert_eq!(issue.to_string(), "category value contains control characters or '>'");

        // Other punctuation is fine
        assert!(raw("Sub-A", "Storage (Premium) <west").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_date_and_cost() {
        let mut record = raw("Sub-A", "Storage");
        record.date = Some("05/01/2024".to_string());
        assert_eq!(record.validate(), Err(RecordIssue::InvalidDate));

        let mut record = raw("Sub-A", "Storage");
        record.cost_usd = Some(f64::NAN);
        assert_eq!(record.validate(), Err(RecordIssue::InvalidCost));
    }

    #[test]
    fn test_timestamp_date_and_default_currency() {
        let mut record = raw("Sub-A", "Storage");
        record.date = Some("2024-05-03T00:00:00Z".to_string());
        record.currency = None;
        let record = record.validate().unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
        assert_eq!(record.currency, DEFAULT_CURRENCY);
    }

    #[test]
    fn test_deserialize_collector_field_names() {
        let json = r#"{
            "date": "2024-05-01",
            "subscription": "Sub-A",
            "category": "Compute",
            "subcategory": "Virtual Machines",
            "meter": "D2s v3",
            "resource": "vm-web-01",
            "costLocal": 1.5,
            "costUSD": 1.75,
            "currency": "CHF"
        }"#;
        let record: RawCostRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.cost_local, Some(1.5));
        assert_eq!(record.cost_usd, Some(1.75));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_dimension_round_trip_names() {
        for dimension in Dimension::ALL {
            assert_eq!(dimension.as_str().parse::<Dimension>().unwrap(), dimension);
            assert_eq!(Dimension::from_depth(dimension.depth()), Some(dimension));
        }
        assert!("region".parse::<Dimension>().is_err());
        assert_eq!(Dimension::Resource.child(), None);
        assert_eq!(Dimension::Meter.child(), Some(Dimension::Resource));
    }

    #[test]
    fn test_load_jsonl_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("costs.jsonl");
        std::fs::write(
            &path,
            "{\"date\":\"2024-05-01\",\"subscription\":\"Sub-A\"}\n\n{\"date\":\"2024-05-02\"}\n",
        )
        .unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].subscription.as_deref(), Some("Sub-A"));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("costs.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_records(&path).is_err());
    }
}
