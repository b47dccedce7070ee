//! GCP billing export provider
//!
//! Runs an aggregate query against the BigQuery billing export table. The
//! query already groups by service and currency, so each row maps to exactly
//! one record.

use serde_json::Value;
use tracing::info;

use super::bigquery::{BigQueryClient, QueryResponse, TableRow, TableSchema};
use super::{parse_amount, CostProvider};
use crate::types::{CloudCostError, CostRecord, Result};

const SERVICE_COLUMN: &str = "service";
const AMOUNT_COLUMN: &str = "amount";
const UNIT_COLUMN: &str = "unit";

/// Build the billing export query for the trailing `days` days
pub fn billing_query(billing_table: &str, days: u32) -> String {
    format!(
        "SELECT
  service.description AS {service},
  SUM(cost) AS {amount},
  currency AS {unit}
FROM `{table}`
WHERE DATE(_PARTITIONTIME) >= DATE_SUB(CURRENT_DATE(), INTERVAL {days} DAY)
  AND cost > 0
GROUP BY service.description, currency
ORDER BY {amount} DESC",
        service = SERVICE_COLUMN,
        amount = AMOUNT_COLUMN,
        unit = UNIT_COLUMN,
        table = billing_table,
        days = days,
    )
}

/// Check a billing table identifier (`[project.]dataset.table`).
///
/// Dataset and table are split off from the right, so domain-scoped project
/// ids such as `example.com:proj` keep their dot.
pub fn validate_billing_table(billing_table: &str) -> Result<()> {
    if billing_table.is_empty() {
        return Err(CloudCostError::Config("billing table is empty".into()));
    }
    if billing_table.contains('`') || billing_table.chars().any(char::is_whitespace) {
        return Err(CloudCostError::Config(format!(
            "invalid billing table '{}': backticks and whitespace are not allowed",
            billing_table
        )));
    }
    let parts: Vec<&str> = billing_table.rsplitn(3, '.').collect();
    if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(CloudCostError::Config(format!(
            "invalid billing table '{}': expected project.dataset.table",
            billing_table
        )));
    }
    Ok(())
}

/// Positions of the cost columns within a result row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostColumns {
    service: usize,
    amount: usize,
    unit: usize,
}

impl CostColumns {
    /// Locate the service/amount/unit columns in the result schema
    pub fn from_schema(schema: Option<&TableSchema>) -> Result<Self> {
        let schema = schema.ok_or_else(|| {
            CloudCostError::MalformedResponse("query response has no schema".into())
        })?;

        let position = |name: &str| {
            schema
                .fields
                .iter()
                .position(|f| f.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    CloudCostError::MalformedResponse(format!(
                        "query result has no '{}' column",
                        name
                    ))
                })
        };

        Ok(Self {
            service: position(SERVICE_COLUMN)?,
            amount: position(AMOUNT_COLUMN)?,
            unit: position(UNIT_COLUMN)?,
        })
    }

    /// Convert one row. A null service or unit becomes an empty string and an
    /// unreadable amount becomes 0.0.
    pub fn record(&self, row: &TableRow) -> Result<CostRecord> {
        let cell = |index: usize| {
            row.f.get(index).map(|c| &c.v).ok_or_else(|| {
                CloudCostError::MalformedResponse(format!(
                    "row has {} cells, expected at least {}",
                    row.f.len(),
                    index + 1
                ))
            })
        };

        Ok(CostRecord {
            service: text_value(cell(self.service)?),
            amount: amount_value(cell(self.amount)?),
            unit: text_value(cell(self.unit)?),
        })
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn amount_value(value: &Value) -> f64 {
    match value {
        Value::String(s) => parse_amount(s),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Convert result rows into records using the column positions in `schema`
pub fn collect_records<I>(schema: Option<&TableSchema>, rows: I) -> Result<Vec<CostRecord>>
where
    I: IntoIterator<Item = Result<TableRow>>,
{
    let columns = CostColumns::from_schema(schema)?;
    rows.into_iter()
        .map(|row| columns.record(&row?))
        .collect()
}

/// Parse a single response page into records
pub fn parse_query_response(response: &QueryResponse) -> Result<Vec<CostRecord>> {
    let rows = response.rows.iter().flatten().cloned().map(Ok);
    collect_records(response.schema.as_ref(), rows)
}

/// Cost provider for the GCP BigQuery billing export
pub struct GcpCostProvider {
    client: BigQueryClient,
    billing_table: String,
}

impl GcpCostProvider {
    /// Create a provider for `project_id` querying `billing_table`
    pub fn new(project_id: &str, billing_table: &str) -> Result<Self> {
        validate_billing_table(billing_table)?;
        Ok(Self::with_client(BigQueryClient::new(project_id)?, billing_table))
    }

    /// Create a provider with a custom client (for testing)
    pub fn with_client(client: BigQueryClient, billing_table: &str) -> Self {
        Self {
            client,
            billing_table: billing_table.to_string(),
        }
    }
}

impl CostProvider for GcpCostProvider {
    fn name(&self) -> &str {
        "gcp"
    }

    fn costs_by_service(&self, days: u32) -> Result<Vec<CostRecord>> {
        info!(
            project = self.client.project_id(),
            table = %self.billing_table,
            days,
            "querying billing export"
        );
        let sql = billing_query(&self.billing_table, days);
        let rows = self.client.query(&sql)?;
        let schema = rows.schema().cloned();
        collect_records(schema.as_ref(), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn fixture(name: &str) -> QueryResponse {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("bigquery")
            .join(name);
        let content = std::fs::read_to_string(path).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    fn response(value: serde_json::Value) -> QueryResponse {
        serde_json::from_value(value).unwrap()
    }

    // ========== billing_query() ==========

    #[test]
    fn test_billing_query_templates_table_and_days() {
        let sql = billing_query("proj.billing.gcp_billing_export_v1", 14);
        assert!(sql.contains("FROM `proj.billing.gcp_billing_export_v1`"));
        assert!(sql.contains("INTERVAL 14 DAY"));
        assert!(sql.contains("AND cost > 0"));
        assert!(sql.contains("GROUP BY service.description, currency"));
        assert!(sql.contains("service.description AS service"));
    }

    // ========== validate_billing_table() ==========

    #[test]
    fn test_validate_billing_table_accepts_full_path() {
        assert!(validate_billing_table("my-proj.billing.gcp_billing_export_v1_0A1B").is_ok());
        assert!(validate_billing_table("billing.export").is_ok());
    }

    #[test]
    fn test_validate_billing_table_accepts_domain_scoped_project() {
        assert!(
            validate_billing_table("example.com:proj.billing.gcp_billing_export_v1").is_ok()
        );
        let sql = billing_query("example.com:proj.billing.gcp_billing_export_v1", 30);
        assert!(sql.contains("FROM `example.com:proj.billing.gcp_billing_export_v1`"));
    }

    #[test]
    fn test_validate_billing_table_rejects_bad_input() {
        for table in ["", "export", "a..b", ".ds.t", "proj.ds.", "proj.ds.t`; DROP", "proj.ds.t x"] {
            assert!(
                matches!(validate_billing_table(table), Err(CloudCostError::Config(_))),
                "{table} should be rejected"
            );
        }
    }

    // ========== parse_query_response() ==========

    #[test]
    fn test_parse_fixture_rows() {
        let records = parse_query_response(&fixture("query_response.json")).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], CostRecord::new("Compute Engine", 120.5, "USD"));
        assert_eq!(records[1].service, "Cloud Storage");
        assert!((records[2].amount - 0.42).abs() < 1e-9);
    }

    #[test]
    fn test_parse_fixture_lenient_amounts() {
        let records = parse_query_response(&fixture("lenient_amounts.json")).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].amount, 0.0);
        assert_eq!(records[1].amount, 0.0);
        assert_eq!(records[1].unit, "");
        assert_eq!(records[2].amount, 9.75);
    }

    #[test]
    fn test_parse_no_rows_is_empty() {
        let value = json!({
            "schema": {"fields": [
                {"name": "service", "type": "STRING"},
                {"name": "amount", "type": "FLOAT"},
                {"name": "unit", "type": "STRING"}
            ]},
            "jobComplete": true
        });
        assert!(parse_query_response(&response(value)).unwrap().is_empty());
    }

    #[test]
    fn test_parse_column_order_from_schema() {
        let value = json!({
            "schema": {"fields": [
                {"name": "unit", "type": "STRING"},
                {"name": "service", "type": "STRING"},
                {"name": "amount", "type": "FLOAT"}
            ]},
            "rows": [{"f": [{"v": "EUR"}, {"v": "BigQuery"}, {"v": "3.5"}]}]
        });
        let records = parse_query_response(&response(value)).unwrap();
        assert_eq!(records, vec![CostRecord::new("BigQuery", 3.5, "EUR")]);
    }

    #[test]
    fn test_parse_missing_schema_is_malformed() {
        let value = json!({"rows": [{"f": [{"v": "x"}, {"v": "1"}, {"v": "USD"}]}]});
        let result = parse_query_response(&response(value));
        assert!(matches!(result, Err(CloudCostError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_missing_column_is_malformed() {
        let value = json!({
            "schema": {"fields": [{"name": "service", "type": "STRING"}]},
            "rows": []
        });
        let result = parse_query_response(&response(value));
        assert!(matches!(result, Err(CloudCostError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_short_row_is_malformed() {
        let value = json!({
            "schema": {"fields": [
                {"name": "service", "type": "STRING"},
                {"name": "amount", "type": "FLOAT"},
                {"name": "unit", "type": "STRING"}
            ]},
            "rows": [{"f": [{"v": "Compute Engine"}]}]
        });
        let result = parse_query_response(&response(value));
        assert!(matches!(result, Err(CloudCostError::MalformedResponse(_))));
    }

    #[test]
    fn test_collect_records_propagates_row_error() {
        let schema = fixture("query_response.json").schema;
        let rows = vec![
            Ok(TableRow::default()),
            Err(CloudCostError::Query("page fetch failed".into())),
        ];
        let result = collect_records(schema.as_ref(), rows);
        assert!(matches!(result, Err(CloudCostError::MalformedResponse(_))));

        let rows: Vec<Result<TableRow>> =
            vec![Err(CloudCostError::Query("page fetch failed".into()))];
        let result = collect_records(schema.as_ref(), rows);
        assert!(matches!(result, Err(CloudCostError::Query(_))));
    }

    #[test]
    fn test_amount_value_accepts_numbers() {
        assert_eq!(amount_value(&json!(4.5)), 4.5);
        assert_eq!(amount_value(&json!("4.5")), 4.5);
        assert_eq!(amount_value(&Value::Null), 0.0);
        assert_eq!(amount_value(&json!(true)), 0.0);
    }

    // ========== GcpCostProvider ==========

    #[tokio::test(flavor = "multi_thread")]
    async fn test_provider_queries_billing_table() {
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let body = std::fs::read_to_string(
            PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("tests/fixtures/bigquery/query_response.json"),
        )
        .unwrap();
        Mock::given(method("POST"))
            .and(path("/projects/proj/queries"))
            .and(body_string_contains("INTERVAL 7 DAY"))
            .and(body_string_contains("proj.billing.export"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = server.uri();
        let records = tokio::task::spawn_blocking(move || {
            let client = BigQueryClient::with_endpoint(&endpoint, "proj", "token".into())?;
            let provider = GcpCostProvider::with_client(client, "proj.billing.export");
            provider.costs_by_service(7)
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].service, "Compute Engine");
    }

    #[test]
    fn test_provider_rejects_invalid_table_before_connecting() {
        let result = GcpCostProvider::new("proj", "not a table");
        assert!(matches!(result, Err(CloudCostError::Config(_))));
    }
}
