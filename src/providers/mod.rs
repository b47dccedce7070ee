//! Cost provider trait and billing backend implementations

pub mod aws;
pub mod bigquery;
pub mod gcp;

pub use aws::{AwsCostProvider, CostExplorerApi, CostWindow, SdkCostExplorer};
pub use gcp::GcpCostProvider;

use crate::types::{CostRecord, Result};

/// A billing backend that can report spend grouped by service
pub trait CostProvider {
    /// Provider name (e.g., "aws")
    fn name(&self) -> &str;

    /// Query the trailing `days`-day window and normalize the response
    fn costs_by_service(&self, days: u32) -> Result<Vec<CostRecord>>;
}

/// Parse a provider amount leniently.
///
/// Empty, unparsable and non-finite values become 0.0 instead of failing the
/// whole response.
pub fn parse_amount(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            tracing::debug!(amount = raw, "unparsable amount, using 0");
            0.0
        }
    }
}
