//! Cost types shared by every provider

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::Aggregator;

/// Spend attributed to one cloud service over the query window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostRecord {
    pub service: String,
    pub amount: f64,
    /// Currency code (e.g., "USD")
    pub unit: String,
}

impl CostRecord {
    pub fn new(service: impl Into<String>, amount: f64, unit: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            amount,
            unit: unit.into(),
        }
    }
}

/// Sorted, totaled view of the records of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub records: Vec<CostRecord>,
    pub total: f64,
    /// Unit of the first record; `None` when there are no records
    pub unit: Option<String>,
}

impl Report {
    /// Build a report from records already in display order.
    ///
    /// The unit label is taken from the first record only. Mixed currencies
    /// are summed as-is.
    pub fn new(records: Vec<CostRecord>) -> Self {
        let total = Aggregator::total(&records);
        let unit = records.first().map(|r| r.unit.clone());
        Self {
            records,
            total,
            unit,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Report presentation format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    /// Parse a format name, falling back to `Table` for anything unrecognized
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "csv" => Self::Csv,
            "table" | "" => Self::Table,
            other => {
                tracing::warn!(format = other, "unknown output format, using table");
                Self::Table
            }
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Table => "table",
            Self::Json => "json",
            Self::Csv => "csv",
        };
        f.write_str(name)
    }
}

/// Per-invocation report settings, resolved from flags and config
#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    /// Trailing window in days
    pub days: u32,
    pub format: OutputFormat,
    /// Keep only the first `top` records after sorting (0 = all)
    pub top: usize,
    /// Sum records sharing a service and unit before sorting
    pub merge_periods: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            days: 30,
            format: OutputFormat::Table,
            top: 0,
            merge_periods: false,
        }
    }
}
