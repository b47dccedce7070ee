//! `cloudcost gcp` subcommand

use anyhow::Context;
use clap::Args;

use super::{emit, ReportArgs};
use crate::config::AppConfig;
use crate::providers::GcpCostProvider;
use crate::services::ReportPipeline;

/// Analyze GCP costs
#[derive(Args, Debug)]
pub struct GcpArgs {
    /// GCP project that runs the billing query
    #[arg(short, long, env = "GOOGLE_CLOUD_PROJECT")]
    pub project: Option<String>,

    /// BigQuery billing export table (e.g. project.dataset.table)
    #[arg(long, env = "CLOUDCOST_BILLING_TABLE")]
    pub billing_table: Option<String>,

    #[command(flatten)]
    pub report: ReportArgs,
}

impl GcpArgs {
    pub fn run(self, config: &AppConfig) -> anyhow::Result<()> {
        let options = self.report.resolve(config)?;
        let (project, billing_table) =
            config.gcp_target(self.project.as_deref(), self.billing_table.as_deref())?;

        eprintln!(
            "fetching gcp costs for project '{}' (last {} days)...",
            project, options.days
        );

        let provider = GcpCostProvider::new(&project, &billing_table)
            .context("failed to create gcp client")?;
        let outcome =
            ReportPipeline::run(&provider, &options).context("failed to get gcp costs")?;

        emit(outcome)
    }
}
