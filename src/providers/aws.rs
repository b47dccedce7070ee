//! AWS Cost Explorer provider
//!
//! Queries `GetCostAndUsage` for the trailing window with monthly granularity,
//! grouped by the `SERVICE` dimension. Every (service, month) group becomes one
//! record; months are not summed here.

use aws_sdk_costexplorer::config::Region;
use aws_sdk_costexplorer::error::DisplayErrorContext;
use aws_sdk_costexplorer::operation::get_cost_and_usage::GetCostAndUsageOutput;
use aws_sdk_costexplorer::types::{
    DateInterval, Granularity, GroupDefinition, GroupDefinitionType, ResultByTime,
};
use chrono::{Days, Local, NaiveDate};
use tracing::{debug, info};

use super::{parse_amount, CostProvider};
use crate::types::{CloudCostError, CostRecord, Result};

/// Cost metric requested from Cost Explorer
const COST_METRIC: &str = "UnblendedCost";

/// Dimension the costs are grouped by
const GROUP_DIMENSION: &str = "SERVICE";

/// Cost Explorer is served from us-east-1
const DEFAULT_REGION: &str = "us-east-1";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Date range `[today - days, today]` sent to Cost Explorer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CostWindow {
    /// Window ending `today` and starting `days` earlier.
    ///
    /// Fails when the start would fall outside the supported date range.
    pub fn trailing(days: u32, today: NaiveDate) -> Result<Self> {
        let start = today
            .checked_sub_days(Days::new(u64::from(days)))
            .ok_or_else(|| {
                CloudCostError::Config(format!("days {} reaches before the earliest date", days))
            })?;
        Ok(Self { start, end: today })
    }

    pub fn start_date(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_date(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

/// Seam over the Cost Explorer client
pub trait CostExplorerApi {
    /// Run the grouped-by-service query for `window`, following all pages
    fn get_cost_and_usage(&self, window: &CostWindow) -> Result<GetCostAndUsageOutput>;
}

/// Cost Explorer client backed by the AWS SDK
pub struct SdkCostExplorer {
    runtime: tokio::runtime::Runtime,
    client: aws_sdk_costexplorer::Client,
}

impl SdkCostExplorer {
    /// Resolve shared config for `profile` (or the default chain) and build a client
    pub fn new(profile: Option<&str>) -> Result<Self> {
        let runtime = Self::runtime()?;

        let sdk_config = runtime.block_on(async {
            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(profile) = profile {
                loader = loader.profile_name(profile);
            }
            loader.load().await
        });

        let mut builder = aws_sdk_costexplorer::config::Builder::from(&sdk_config);
        if sdk_config.region().is_none() {
            debug!(region = DEFAULT_REGION, "no region configured, using default");
            builder = builder.region(Region::new(DEFAULT_REGION));
        }

        Ok(Self {
            runtime,
            client: aws_sdk_costexplorer::Client::from_conf(builder.build()),
        })
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: aws_sdk_costexplorer::Client) -> Result<Self> {
        Ok(Self {
            runtime: Self::runtime()?,
            client,
        })
    }

    fn runtime() -> Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CloudCostError::client("aws", e))
    }
}

impl CostExplorerApi for SdkCostExplorer {
    fn get_cost_and_usage(&self, window: &CostWindow) -> Result<GetCostAndUsageOutput> {
        let period = DateInterval::builder()
            .start(window.start_date())
            .end(window.end_date())
            .build()
            .map_err(|e| CloudCostError::Query(e.to_string()))?;
        let group_by = GroupDefinition::builder()
            .r#type(GroupDefinitionType::Dimension)
            .key(GROUP_DIMENSION)
            .build();

        self.runtime.block_on(async {
            let mut buckets: Option<Vec<ResultByTime>> = None;
            let mut next_page_token: Option<String> = None;
            let mut page = 0usize;

            loop {
                let output = self
                    .client
                    .get_cost_and_usage()
                    .time_period(period.clone())
                    .granularity(Granularity::Monthly)
                    .metrics(COST_METRIC)
                    .group_by(group_by.clone())
                    .set_next_page_token(next_page_token.take())
                    .send()
                    .await
                    .map_err(|e| CloudCostError::Query(DisplayErrorContext(&e).to_string()))?;

                page += 1;
                let GetCostAndUsageOutput {
                    results_by_time,
                    next_page_token: token,
                    ..
                } = output;

                if let Some(results) = results_by_time {
                    buckets.get_or_insert_with(Vec::new).extend(results);
                }
                debug!(page, more = token.is_some(), "cost explorer page received");

                match token {
                    Some(t) if !t.is_empty() => next_page_token = Some(t),
                    _ => break,
                }
            }

            Ok(GetCostAndUsageOutput::builder()
                .set_results_by_time(buckets)
                .build())
        })
    }
}

/// Cost provider for AWS Cost Explorer
pub struct AwsCostProvider<A = SdkCostExplorer> {
    api: A,
}

impl AwsCostProvider<SdkCostExplorer> {
    /// Create a provider using the given shared-config profile
    pub fn new(profile: Option<&str>) -> Result<Self> {
        Ok(Self::with_api(SdkCostExplorer::new(profile)?))
    }
}

impl<A: CostExplorerApi> AwsCostProvider<A> {
    /// Create a provider with a custom API (for testing)
    pub fn with_api(api: A) -> Self {
        Self { api }
    }
}

impl<A: CostExplorerApi> CostProvider for AwsCostProvider<A> {
    fn name(&self) -> &str {
        "aws"
    }

    fn costs_by_service(&self, days: u32) -> Result<Vec<CostRecord>> {
        let window = CostWindow::trailing(days, Local::now().date_naive())?;
        info!(
            start = %window.start_date(),
            end = %window.end_date(),
            "querying cost explorer"
        );
        let output = self.api.get_cost_and_usage(&window)?;
        parse_cost_response(&output)
    }
}

/// Flatten a `GetCostAndUsage` response into one record per (service, bucket).
///
/// Groups without keys are skipped. A missing or unparsable `UnblendedCost`
/// amount becomes 0.0 and a missing unit becomes an empty string.
pub fn parse_cost_response(output: &GetCostAndUsageOutput) -> Result<Vec<CostRecord>> {
    let buckets = output.results_by_time.as_ref().ok_or_else(|| {
        CloudCostError::MalformedResponse("GetCostAndUsage response has no ResultsByTime".into())
    })?;

    let mut records = Vec::new();
    for bucket in buckets {
        for group in bucket.groups() {
            let Some(service) = group.keys().first() else {
                debug!("group without keys, skipping");
                continue;
            };

            let metric = group.metrics().and_then(|m| m.get(COST_METRIC));
            let amount = metric
                .and_then(|m| m.amount())
                .map(parse_amount)
                .unwrap_or(0.0);
            let unit = metric.and_then(|m| m.unit()).unwrap_or_default();

            records.push(CostRecord::new(service.as_str(), amount, unit));
        }
    }

    Ok(records)
}
