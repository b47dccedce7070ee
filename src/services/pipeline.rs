//! Report pipeline: provider -> aggregator -> renderer

use tracing::{debug, info};

use crate::providers::CostProvider;
use crate::services::{Aggregator, Renderer};
use crate::types::{CostRecord, Report, ReportOptions, Result};

/// Outcome of one report run
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// Provider returned no records; nothing was rendered
    NoData,
    /// Rendered report body
    Rendered(String),
}

/// Runs one provider query through sorting, truncation and rendering
pub struct ReportPipeline;

impl ReportPipeline {
    /// Fetch costs from `provider` and render them per `options`
    pub fn run(provider: &dyn CostProvider, options: &ReportOptions) -> Result<ReportOutcome> {
        info!(
            provider = provider.name(),
            days = options.days,
            "fetching costs by service"
        );
        let records = provider.costs_by_service(options.days)?;
        debug!(provider = provider.name(), count = records.len(), "records fetched");

        Self::render_records(records, options)
    }

    /// Sort, truncate and render records already fetched from a provider
    pub fn render_records(
        records: Vec<CostRecord>,
        options: &ReportOptions,
    ) -> Result<ReportOutcome> {
        match Self::build_report(records, options) {
            Some(report) => Renderer::render(&report, options.format).map(ReportOutcome::Rendered),
            None => Ok(ReportOutcome::NoData),
        }
    }

    /// Build the report that would be rendered, or `None` when there is no data.
    ///
    /// `top` truncation happens before totaling, so `total` and `unit` describe
    /// only the records that are shown.
    pub fn build_report(records: Vec<CostRecord>, options: &ReportOptions) -> Option<Report> {
        if records.is_empty() {
            return None;
        }

        let records = if options.merge_periods {
            Aggregator::merge_by_service(records)
        } else {
            records
        };
        let sorted = Aggregator::sort_descending(records);
        let shown = Aggregator::top(sorted, options.top);

        Some(Report::new(shown))
    }
}
