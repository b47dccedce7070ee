//! Config file loading (~/.config/cloudcost/config.toml)
//!
//! Every field is optional; command-line flags take precedence over the file
//! and the file takes precedence over built-in defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::{CloudCostError, OutputFormat, ReportOptions, Result};

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub report: ReportSection,
    pub aws: AwsSection,
    pub gcp: GcpSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReportSection {
    pub days: Option<u32>,
    pub output: Option<String>,
    pub top: Option<usize>,
    pub merge_periods: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AwsSection {
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GcpSection {
    pub project: Option<String>,
    pub billing_table: Option<String>,
}

/// Report flags as given on the command line (None = not given)
#[derive(Debug, Clone, Default)]
pub struct ReportOverrides {
    pub days: Option<u32>,
    pub output: Option<String>,
    pub top: Option<usize>,
    pub merge_periods: bool,
}

impl AppConfig {
    /// Default config path (<config dir>/cloudcost/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "cloudcost")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load config from an explicit path, or the default path if present.
    ///
    /// A missing default file yields the empty config; a missing explicit
    /// file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => {
                    debug!("no config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CloudCostError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            CloudCostError::Config(format!("invalid config {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Resolve report options: flag > config file > default
    pub fn report_options(&self, flags: &ReportOverrides) -> ReportOptions {
        let defaults = ReportOptions::default();
        let output = flags.output.as_deref().or(self.report.output.as_deref());

        ReportOptions {
            days: flags.days.or(self.report.days).unwrap_or(defaults.days),
            format: output
                .map(OutputFormat::parse_lenient)
                .unwrap_or(defaults.format),
            top: flags.top.or(self.report.top).unwrap_or(defaults.top),
            merge_periods: flags.merge_periods
                || self.report.merge_periods.unwrap_or(defaults.merge_periods),
        }
    }

    /// AWS profile: flag (or `AWS_PROFILE`) > config file > SDK default chain
    pub fn aws_profile(&self, flag: Option<&str>) -> Option<String> {
        flag.map(str::to_string).or_else(|| self.aws.profile.clone())
    }

    /// GCP project and billing table; both are required after merging
    pub fn gcp_target(
        &self,
        project: Option<&str>,
        billing_table: Option<&str>,
    ) -> Result<(String, String)> {
        let project = project
            .map(str::to_string)
            .or_else(|| self.gcp.project.clone())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                CloudCostError::Config("gcp project is required (--project)".into())
            })?;
        let billing_table = billing_table
            .map(str::to_string)
            .or_else(|| self.gcp.billing_table.clone())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CloudCostError::Config("billing table is required (--billing-table)".into())
            })?;
        Ok((project, billing_table))
    }
}
