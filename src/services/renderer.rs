//! Report rendering (table, JSON, CSV)
//!
//! Renderers print records in the order they are given; sorting and
//! truncation happen before a `Report` is built.

use serde::Serialize;

use crate::types::{CloudCostError, CostRecord, OutputFormat, Report, Result};

const TABLE_HEADER: [&str; 3] = ["SERVICE", "COST", "UNIT"];
const TABLE_DIVIDER: [&str; 3] = ["-------", "----", "----"];
const CSV_HEADER: [&str; 3] = ["service", "cost", "unit"];
const TOTAL_LABEL: &str = "TOTAL";

/// Gap between table columns
const COLUMN_GAP: &str = "  ";

#[derive(Serialize)]
struct JsonReport<'a> {
    services: &'a [CostRecord],
    total: f64,
    unit: &'a str,
}

/// Renders a report into one of the supported text formats
pub struct Renderer;

impl Renderer {
    /// Render a non-empty report
    pub fn render(report: &Report, format: OutputFormat) -> Result<String> {
        let unit = match (&report.unit, report.is_empty()) {
            (Some(unit), false) => unit.as_str(),
            _ => return Err(CloudCostError::Render("report has no records".into())),
        };

        match format {
            OutputFormat::Table => Ok(Self::table(&report.records, report.total, unit)),
            OutputFormat::Json => Self::json(&report.records, report.total, unit),
            OutputFormat::Csv => Self::csv(&report.records, report.total, unit),
        }
    }

    fn table(records: &[CostRecord], total: f64, unit: &str) -> String {
        let mut rows: Vec<[String; 3]> = Vec::with_capacity(records.len() + 4);
        rows.push(TABLE_HEADER.map(String::from));
        rows.push(TABLE_DIVIDER.map(String::from));
        for r in records {
            rows.push([r.service.clone(), format!("{:.2}", r.amount), r.unit.clone()]);
        }
        rows.push(TABLE_DIVIDER.map(String::from));
        rows.push([
            TOTAL_LABEL.to_string(),
            format!("{:.2}", total),
            unit.to_string(),
        ]);

        let width = |col: usize| {
            rows.iter()
                .map(|row| row[col].chars().count())
                .max()
                .unwrap_or(0)
        };
        let (service_w, cost_w) = (width(0), width(1));

        // Only the service and cost cells are padded; the unit cell is written as is
        let mut out = String::new();
        for [service, cost, row_unit] in &rows {
            out.push_str(&format!(
                "{:<service_w$}{gap}{:<cost_w$}{gap}{}\n",
                service,
                cost,
                row_unit,
                gap = COLUMN_GAP
            ));
        }
        out
    }

    fn json(records: &[CostRecord], total: f64, unit: &str) -> Result<String> {
        let body = JsonReport {
            services: records,
            total,
            unit,
        };
        let mut json = serde_json::to_string_pretty(&body)
            .map_err(|e| CloudCostError::Render(e.to_string()))?;
        json.push('\n');
        Ok(json)
    }

    fn csv(records: &[CostRecord], total: f64, unit: &str) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let map_err = |e: csv::Error| CloudCostError::Render(e.to_string());

        writer.write_record(CSV_HEADER).map_err(map_err)?;
        for r in records {
            let amount = format!("{:.2}", r.amount);
            writer
                .write_record([r.service.as_str(), amount.as_str(), r.unit.as_str()])
                .map_err(map_err)?;
        }
        let total = format!("{:.2}", total);
        writer
            .write_record([TOTAL_LABEL, total.as_str(), unit])
            .map_err(map_err)?;

        let bytes = writer
            .into_inner()
            .map_err(|e| CloudCostError::Render(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| CloudCostError::Render(e.to_string()))
    }
}
