//! Command-line interface

mod aws;
mod gcp;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, ReportOverrides};
use crate::services::ReportOutcome;
use crate::types::ReportOptions;

pub use aws::AwsArgs;
pub use gcp::GcpArgs;

/// Cloud cost analyzer for AWS and GCP
#[derive(Parser)]
#[command(name = "cloudcost")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: <config dir>/cloudcost/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze AWS costs from Cost Explorer
    Aws(AwsArgs),

    /// Analyze GCP costs from the BigQuery billing export
    Gcp(GcpArgs),
}

/// Report flags shared by every provider
#[derive(Args, Debug, Clone, Default)]
pub struct ReportArgs {
    /// Number of days to analyze [default: 30]
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub days: Option<u32>,

    /// Output format (table, json, csv) [default: table]
    #[arg(short, long)]
    pub output: Option<String>,

    /// Show top N services (0 = all)
    #[arg(short, long)]
    pub top: Option<usize>,

    /// Sum a service's monthly buckets into one row
    #[arg(long)]
    pub merge_periods: bool,
}

impl ReportArgs {
    fn overrides(&self) -> ReportOverrides {
        ReportOverrides {
            days: self.days,
            output: self.output.clone(),
            top: self.top,
            merge_periods: self.merge_periods,
        }
    }

    /// Merge flags with the config file into validated report options
    pub(crate) fn resolve(&self, config: &AppConfig) -> anyhow::Result<ReportOptions> {
        let options = config.report_options(&self.overrides());
        anyhow::ensure!(options.days > 0, "days must be at least 1");
        Ok(options)
    }
}

impl Cli {
    /// Install the tracing subscriber (stderr, RUST_LOG aware)
    pub fn init_logging(&self) {
        let default_level = if self.verbose { "debug" } else { "warn" };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    }

    pub fn run(self) -> anyhow::Result<()> {
        let config = AppConfig::load(self.config.as_deref()).context("failed to load config")?;
        match self.command {
            Commands::Aws(args) => args.run(&config),
            Commands::Gcp(args) => args.run(&config),
        }
    }
}

/// Print a pipeline outcome to stdout.
///
/// A closed stdout (e.g. piped into `head`) is not an error.
pub(crate) fn emit(outcome: ReportOutcome) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    write_outcome(&mut stdout.lock(), &outcome).context("failed to write report")
}

fn write_outcome(out: &mut impl Write, outcome: &ReportOutcome) -> io::Result<()> {
    let result = match outcome {
        ReportOutcome::NoData => writeln!(out, "no cost data found"),
        ReportOutcome::Rendered(text) => out.write_all(text.as_bytes()),
    }
    .and_then(|()| out.flush());

    match result {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}
