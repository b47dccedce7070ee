//! BigQuery REST client for running one query and paging through its rows
//!
//! Uses `jobs.query` to start the query and `jobs.getQueryResults` both to wait
//! for incomplete jobs and to fetch further pages.

use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

use crate::types::{CloudCostError, Result};

/// BigQuery REST API base URL
const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Environment variable holding an OAuth access token
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Server-side wait per request for the job to finish
const QUERY_WAIT_MS: u64 = 10_000;

/// Maximum `getQueryResults` polls before giving up on an incomplete job
const MAX_POLLS: usize = 30;

/// `jobs.query` / `jobs.getQueryResults` response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Option<Vec<TableRow>>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub job_complete: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
}

/// One result row; cells are positional, matching the schema fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Resolve an access token from the environment or the gcloud CLI
pub fn access_token() -> Result<String> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        let token = token.trim();
        if !token.is_empty() {
            debug!("using access token from {}", ACCESS_TOKEN_ENV);
            return Ok(token.to_string());
        }
    }

    let output = Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .map_err(|e| {
            CloudCostError::client(
                "gcp",
                format!("set {} or install gcloud ({})", ACCESS_TOKEN_ENV, e),
            )
        })?;

    if !output.status.success() {
        return Err(CloudCostError::client(
            "gcp",
            format!(
                "gcloud auth print-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(CloudCostError::client(
            "gcp",
            "gcloud returned an empty access token",
        ));
    }
    Ok(token)
}

/// Blocking BigQuery client bound to one project
pub struct BigQueryClient {
    http: Client,
    endpoint: String,
    project_id: String,
    token: String,
}

impl BigQueryClient {
    /// Create a client for `project_id` against the public endpoint
    pub fn new(project_id: &str) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, project_id, access_token()?)
    }

    /// Create a client with a custom endpoint and token (for testing)
    pub fn with_endpoint(endpoint: &str, project_id: &str, token: String) -> Result<Self> {
        if project_id.trim().is_empty() {
            return Err(CloudCostError::client("gcp", "project id is empty"));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CloudCostError::client("gcp", format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            token,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Run a standard-SQL query and return an iterator over its rows.
    ///
    /// Blocks until the job completes (or `MAX_POLLS` waits elapse).
    pub fn query(&self, sql: &str) -> Result<RowIterator<'_>> {
        let url = format!("{}/projects/{}/queries", self.endpoint, self.project_id);
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: QUERY_WAIT_MS,
        };

        let mut response = self.send(self.http.post(&url).json(&request))?;

        let mut polls = 0;
        while response.job_complete == Some(false) {
            polls += 1;
            if polls > MAX_POLLS {
                return Err(CloudCostError::Query(
                    "timed out waiting for BigQuery job to complete".into(),
                ));
            }
            let job = response.job_reference.clone().ok_or_else(|| {
                CloudCostError::MalformedResponse("incomplete job without jobReference".into())
            })?;
            debug!(job_id = %job.job_id, polls, "waiting for query job");
            response = self.query_results(&job, None)?;
        }

        Ok(RowIterator::new(self, response))
    }

    fn query_results(&self, job: &JobReference, page_token: Option<&str>) -> Result<QueryResponse> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.endpoint, job.project_id, job.job_id
        );

        let mut params: Vec<(&str, String)> = vec![("timeoutMs", QUERY_WAIT_MS.to_string())];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        self.send(self.http.get(&url).query(&params))
    }

    fn send(&self, request: RequestBuilder) -> Result<QueryResponse> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| CloudCostError::Query(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(CloudCostError::Query(format!(
                "BigQuery returned {}: {}",
                status, message
            )));
        }

        response
            .json()
            .map_err(|e| CloudCostError::MalformedResponse(format!("invalid BigQuery response: {}", e)))
    }
}

/// Iterator over query rows, fetching further pages on demand.
///
/// `None` means all rows have been read.
pub struct RowIterator<'a> {
    client: &'a BigQueryClient,
    schema: Option<TableSchema>,
    job: Option<JobReference>,
    rows: std::vec::IntoIter<TableRow>,
    page_token: Option<String>,
    failed: bool,
}

impl<'a> RowIterator<'a> {
    fn new(client: &'a BigQueryClient, first_page: QueryResponse) -> Self {
        Self {
            client,
            schema: first_page.schema,
            job: first_page.job_reference,
            rows: first_page.rows.unwrap_or_default().into_iter(),
            page_token: first_page.page_token.filter(|t| !t.is_empty()),
            failed: false,
        }
    }

    /// Schema of the result set, as reported on the first page
    pub fn schema(&self) -> Option<&TableSchema> {
        self.schema.as_ref()
    }
}

impl Iterator for RowIterator<'_> {
    type Item = Result<TableRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.rows.next() {
                return Some(Ok(row));
            }
            if self.failed {
                return None;
            }

            let token = self.page_token.take()?;
            let Some(job) = &self.job else {
                self.failed = true;
                return Some(Err(CloudCostError::MalformedResponse(
                    "pageToken without jobReference".into(),
                )));
            };

            match self.client.query_results(job, Some(&token)) {
                Ok(page) => {
                    debug!(rows = page.rows.as_ref().map_or(0, Vec::len), "fetched next page");
                    self.rows = page.rows.unwrap_or_default().into_iter();
                    self.page_token = page.page_token.filter(|t| !t.is_empty());
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn schema_json() -> serde_json::Value {
        json!({
            "fields": [
                {"name": "service", "type": "STRING"},
                {"name": "amount", "type": "FLOAT"},
                {"name": "unit", "type": "STRING"}
            ]
        })
    }

    fn row(service: &str, amount: &str) -> serde_json::Value {
        json!({"f": [{"v": service}, {"v": amount}, {"v": "USD"}]})
    }

    /// Run the blocking client off the async test runtime
    async fn run_query(endpoint: String, sql: &'static str) -> Result<Vec<TableRow>> {
        tokio::task::spawn_blocking(move || {
            let client = BigQueryClient::with_endpoint(&endpoint, "proj", "test-token".into())?;
            let rows = client.query(sql)?;
            rows.collect::<Result<Vec<_>>>()
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_query_response_deserialize() {
        let body = json!({
            "kind": "bigquery#queryResponse",
            "schema": schema_json(),
            "jobReference": {"projectId": "proj", "jobId": "job_1", "location": "US"},
            "totalRows": "1",
            "rows": [row("Compute Engine", "12.5")],
            "jobComplete": true
        });
        let response: QueryResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.schema.unwrap().fields.len(), 3);
        assert_eq!(response.rows.unwrap()[0].f[0].v, "Compute Engine");
        assert_eq!(response.job_reference.unwrap().location.as_deref(), Some("US"));
        assert_eq!(response.job_complete, Some(true));
    }

    #[test]
    fn test_with_endpoint_rejects_empty_project() {
        let result = BigQueryClient::with_endpoint("http://localhost", " ", "t".into());
        assert!(matches!(
            result,
            Err(CloudCostError::ClientConstruction { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_query_single_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/queries"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({"useLegacySql": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "schema": schema_json(),
                "jobReference": {"projectId": "proj", "jobId": "job_1"},
                "rows": [row("Compute Engine", "12.5"), row("Cloud Storage", "3")],
                "jobComplete": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = run_query(server.uri(), "SELECT 1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].f[0].v, "Cloud Storage");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_query_follows_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/queries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "schema": schema_json(),
                "jobReference": {"projectId": "proj", "jobId": "job_1", "location": "EU"},
                "rows": [row("Compute Engine", "12.5")],
                "pageToken": "page-2",
                "jobComplete": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/proj/queries/job_1"))
            .and(query_param("pageToken", "page-2"))
            .and(query_param("location", "EU"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rows": [row("BigQuery", "1.25")],
                "jobComplete": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = run_query(server.uri(), "SELECT 1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].f[0].v, "BigQuery");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_query_waits_for_incomplete_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/queries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobReference": {"projectId": "proj", "jobId": "job_slow"},
                "jobComplete": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/proj/queries/job_slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "schema": schema_json(),
                "jobReference": {"projectId": "proj", "jobId": "job_slow"},
                "rows": [row("Compute Engine", "7")],
                "jobComplete": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = run_query(server.uri(), "SELECT 1").await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_query_error_status_surfaces_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/queries"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "Access Denied: Table billing.export"}
            })))
            .mount(&server)
            .await;

        let err = run_query(server.uri(), "SELECT 1").await.unwrap_err();
        assert!(matches!(err, CloudCostError::Query(_)));
        assert!(err.to_string().contains("Access Denied"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_query_no_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/queries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "schema": schema_json(),
                "jobReference": {"projectId": "proj", "jobId": "job_1"},
                "totalRows": "0",
                "jobComplete": true
            })))
            .mount(&server)
            .await;

        let rows = run_query(server.uri(), "SELECT 1").await.unwrap();
        assert!(rows.is_empty());
    }
}
