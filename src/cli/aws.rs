//! `cloudcost aws` subcommand

use anyhow::Context;
use clap::Args;

use super::{emit, ReportArgs};
use crate::config::AppConfig;
use crate::providers::AwsCostProvider;
use crate::services::ReportPipeline;

/// Analyze AWS costs
#[derive(Args, Debug)]
pub struct AwsArgs {
    /// AWS shared-config profile (default: SDK credential chain)
    #[arg(short, long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    #[command(flatten)]
    pub report: ReportArgs,
}

impl AwsArgs {
    pub fn run(self, config: &AppConfig) -> anyhow::Result<()> {
        let options = self.report.resolve(config)?;
        let profile = config.aws_profile(self.profile.as_deref());

        eprintln!("fetching aws costs for last {} days...", options.days);

        let provider =
            AwsCostProvider::new(profile.as_deref()).context("failed to create aws client")?;
        let outcome =
            ReportPipeline::run(&provider, &options).context("failed to get aws costs")?;

        emit(outcome)
    }
}
