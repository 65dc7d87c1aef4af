//! Google BigQuery source.
//!
//! Runs the extraction query through the BigQuery v2 REST API and pages
//! through the result set with `pageToken`s.
//!
//! # Protocol
//!
//! 1. `POST {api_base}/projects/{project}/queries` submits the query and
//!    returns the first page when the job finishes within `timeoutMs`.
//! 2. While `jobComplete` is false, `GET .../queries/{jobId}` is polled.
//! 3. Every further page is `GET .../queries/{jobId}?pageToken=...`.
//!
//! Rows are encoded as `{"f": [{"v": ...}, ...]}` in schema order. INT64
//! values arrive as strings; TIMESTAMP values arrive as int64 microseconds
//! because the request sets `formatOptions.useInt64Timestamp`.
//!
//! # Environment Variables
//!
//! - `GOOGLE_OAUTH_ACCESS_TOKEN` (name configurable): OAuth2 bearer token,
//!   e.g. from `gcloud auth print-access-token`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::error::EtlError;
use crate::source::{PageCursor, RowPage, RowSource, SourceRow};

pub const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// A BigQuery project handle that implements [`RowSource`].
pub struct BigQuerySource {
    client: reqwest::Client,
    api_base: String,
    project_id: String,
    token: String,
    poll_timeout_ms: u64,
}

impl BigQuerySource {
    /// Build a source from config, reading the access token from the
    /// configured environment variable.
    ///
    /// # Errors
    ///
    /// [`EtlError::Connection`] if the token is missing or the HTTP client
    /// cannot be constructed.
    pub fn from_config(config: &SourceConfig) -> Result<Self, EtlError> {
        let token = std::env::var(&config.access_token_env).map_err(|_| {
            EtlError::connection(
                "bigquery",
                format!(
                    "access token environment variable {} is not set",
                    config.access_token_env
                ),
            )
        })?;
        Self::with_token(config, token)
    }

    pub fn with_token(config: &SourceConfig, token: String) -> Result<Self, EtlError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("hn-etl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EtlError::connection("bigquery", e))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            token,
            poll_timeout_ms: config.poll_timeout_ms,
        })
    }

    fn queries_url(&self) -> String {
        format!("{}/projects/{}/queries", self.api_base, self.project_id)
    }

    async fn get_results(
        &self,
        job_id: &str,
        location: Option<&str>,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<QueryResponse> {
        let url = format!("{}/{}", self.queries_url(), job_id);
        let mut query: Vec<(&str, String)> = vec![
            ("maxResults", page_size.to_string()),
            ("timeoutMs", self.poll_timeout_ms.to_string()),
            ("formatOptions.useInt64Timestamp", "true".to_string()),
        ];
        if let Some(loc) = location {
            query.push(("location", loc.to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        read_response(resp).await
    }
}

async fn read_response(resp: reqwest::Response) -> Result<QueryResponse> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("BigQuery returned {}: {}", status, body);
    }
    resp.json::<QueryResponse>()
        .await
        .context("Failed to parse BigQuery response")
}

#[async_trait]
impl RowSource for BigQuerySource {
    async fn open(&self, sql: &str, page_size: u32) -> Result<RowPage> {
        let body = serde_json::json!({
            "query": sql,
            "useLegacySql": false,
            "maxResults": page_size,
            "timeoutMs": self.poll_timeout_ms,
            "formatOptions": { "useInt64Timestamp": true }
        });

        let url = self.queries_url();
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        let mut response = read_response(resp).await?;

        while !response.job_complete {
            let job = response
                .job_reference
                .as_ref()
                .ok_or_else(|| anyhow!("incomplete query response has no job reference"))?;
            log::debug!("Query job {} still running, polling", job.job_id);
            response = self
                .get_results(&job.job_id, job.location.as_deref(), None, page_size)
                .await?;
        }

        response.into_page()
    }

    async fn next_page(&self, cursor: &PageCursor, page_size: u32) -> Result<RowPage> {
        let response = self
            .get_results(
                &cursor.job_id,
                cursor.location.as_deref(),
                Some(&cursor.page_token),
                page_size,
            )
            .await?;
        if !response.job_complete {
            bail!("job {} reported incomplete while paging", cursor.job_id);
        }
        response.into_page()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Wire format
// ═══════════════════════════════════════════════════════════════════════

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

/// Column positions of the six extracted fields within a row.
#[derive(Debug, PartialEq, Eq)]
struct Columns {
    title: usize,
    url: usize,
    score: usize,
    timestamp: usize,
    id: usize,
    kind: usize,
}

impl Columns {
    /// Positions as written in the query's SELECT list.
    const QUERY_ORDER: Columns = Columns {
        title: 0,
        url: 1,
        score: 2,
        timestamp: 3,
        id: 4,
        kind: 5,
    };

    /// Number of cells a row must carry to hold every column.
    fn width(&self) -> usize {
        [self.title, self.url, self.score, self.timestamp, self.id, self.kind]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }

    fn from_schema(schema: Option<&TableSchema>) -> Result<Columns> {
        let Some(schema) = schema.filter(|s| !s.fields.is_empty()) else {
            return Ok(Columns::QUERY_ORDER);
        };
        let position = |name: &str| {
            schema
                .fields
                .iter()
                .position(|f| f.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| anyhow!("result schema has no '{}' column", name))
        };
        Ok(Columns {
            title: position("title")?,
            url: position("url")?,
            score: position("score")?,
            timestamp: position("timestamp")?,
            id: position("id")?,
            kind: position("type")?,
        })
    }
}

impl QueryResponse {
    fn into_page(self) -> Result<RowPage> {
        let columns = Columns::from_schema(self.schema.as_ref())?;
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| decode_row(row, &columns).with_context(|| format!("row {}", i)))
            .collect::<Result<Vec<_>>>()?;

        let next = match (self.page_token, self.job_reference) {
            (Some(page_token), Some(job)) if !page_token.is_empty() => Some(PageCursor {
                job_id: job.job_id,
                location: job.location,
                page_token,
            }),
            (Some(_), None) => bail!("response has a page token but no job reference"),
            _ => None,
        };

        Ok(RowPage { rows, next })
    }
}

fn decode_row(row: &TableRow, columns: &Columns) -> Result<SourceRow> {
    let needed = columns.width();
    if row.f.len() < needed {
        bail!("row has {} cells, expected at least {}", row.f.len(), needed);
    }
    let cell = |i: usize| &row.f[i].v;
    Ok(SourceRow {
        title: decode_string(cell(columns.title)),
        url: decode_string(cell(columns.url)),
        score: decode_int(cell(columns.score)).context("score")?,
        timestamp: decode_timestamp(cell(columns.timestamp)).context("timestamp")?,
        id: decode_int(cell(columns.id)).context("id")?,
        kind: decode_string(cell(columns.kind)),
    })
}

fn decode_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn decode_int(v: &Value) -> Result<Option<i64>> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.parse::<i64>().with_context(|| {
            format!("not an INT64: {:?}", s)
        })?)),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| anyhow!("not an INT64: {}", n)),
        other => bail!("unexpected INT64 value: {}", other),
    }
}

/// Decode int64 microseconds, or float seconds (`"1.2E9"`) as a fallback.
fn decode_timestamp(v: &Value) -> Result<Option<DateTime<Utc>>> {
    let text = match v {
        Value::Null => return Ok(None),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => bail!("unexpected TIMESTAMP value: {}", other),
    };

    if let Ok(micros) = text.parse::<i64>() {
        return DateTime::from_timestamp_micros(micros)
            .map(Some)
            .ok_or_else(|| anyhow!("TIMESTAMP out of range: {}", micros));
    }

    let secs: f64 = text
        .parse()
        .with_context(|| format!("not a TIMESTAMP: {:?}", text))?;
    if !secs.is_finite() {
        bail!("not a TIMESTAMP: {:?}", text);
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
        .map(Some)
        .ok_or_else(|| anyhow!("TIMESTAMP out of range: {}", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(json: Value) -> QueryResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn decodes_first_page_with_token() {
        let response = parse(serde_json::json!({
            "kind": "bigquery#queryResponse",
            "jobComplete": true,
            "jobReference": { "projectId": "p", "jobId": "job_abc", "location": "US" },
            "schema": { "fields": [
                { "name": "title", "type": "STRING" },
                { "name": "url", "type": "STRING" },
                { "name": "score", "type": "INTEGER" },
                { "name": "timestamp", "type": "TIMESTAMP" },
                { "name": "id", "type": "INTEGER" },
                { "name": "type", "type": "STRING" }
            ]},
            "rows": [
                { "f": [
                    { "v": "My YC app: Dropbox" },
                    { "v": "http://www.getdropbox.com/u/2/screencast.html" },
                    { "v": "111" },
                    { "v": "1175714200000000" },
                    { "v": "8863" },
                    { "v": "story" }
                ]},
                { "f": [
                    { "v": "Ask HN: anything" },
                    { "v": null },
                    { "v": null },
                    { "v": null },
                    { "v": "9000" },
                    { "v": "story" }
                ]}
            ],
            "pageToken": "BFQ2X",
            "totalRows": "4"
        }));

        let page = response.into_page().unwrap();
        assert_eq!(page.rows.len(), 2);

        let first = &page.rows[0];
        assert_eq!(first.id, Some(8863));
        assert_eq!(first.score, Some(111));
        assert_eq!(
            first.timestamp,
            Some(Utc.with_ymd_and_hms(2007, 4, 4, 19, 16, 40).unwrap())
        );

        let second = &page.rows[1];
        assert_eq!(second.url, None);
        assert_eq!(second.score, None);
        assert_eq!(second.timestamp, None);

        let cursor = page.next.expect("next page cursor");
        assert_eq!(cursor.job_id, "job_abc");
        assert_eq!(cursor.location.as_deref(), Some("US"));
        assert_eq!(cursor.page_token, "BFQ2X");
    }

    #[test]
    fn last_page_has_no_cursor() {
        let response = parse(serde_json::json!({
            "jobComplete": true,
            "jobReference": { "jobId": "job_abc" },
            "rows": [ { "f": [
                { "v": "t" }, { "v": "u" }, { "v": "1" }, { "v": null }, { "v": "5" }, { "v": "job" }
            ]}]
        }));
        let page = response.into_page().unwrap();
        assert_eq!(page.rows[0].kind.as_deref(), Some("job"));
        assert!(page.next.is_none());
    }

    #[test]
    fn schema_order_is_respected() {
        let response = parse(serde_json::json!({
            "jobComplete": true,
            "schema": { "fields": [
                { "name": "id" }, { "name": "type" }, { "name": "title" },
                { "name": "url" }, { "name": "score" }, { "name": "timestamp" }
            ]},
            "rows": [ { "f": [
                { "v": "77" }, { "v": "comment" }, { "v": "x" },
                { "v": "None" }, { "v": null }, { "v": null }
            ]}]
        }));
        let page = response.into_page().unwrap();
        assert_eq!(page.rows[0].id, Some(77));
        assert_eq!(page.rows[0].kind.as_deref(), Some("comment"));
        assert_eq!(page.rows[0].title.as_deref(), Some("x"));
    }

    #[test]
    fn bad_integer_is_an_error() {
        let response = parse(serde_json::json!({
            "jobComplete": true,
            "rows": [ { "f": [
                { "v": "t" }, { "v": "u" }, { "v": "many" }, { "v": null }, { "v": "1" }, { "v": "story" }
            ]}]
        }));
        let err = response.into_page().unwrap_err();
        assert!(format!("{:#}", err).contains("score"), "got: {:#}", err);
    }

    #[test]
    fn float_seconds_timestamp_fallback() {
        let ts = decode_timestamp(&Value::String("1.1757142E9".into()))
            .unwrap()
            .unwrap();
        assert_eq!(ts.timestamp(), 1_175_714_200);
    }

    #[test]
    fn non_finite_timestamp_is_an_error() {
        for text in ["NaN", "inf", "-inf"] {
            assert!(
                decode_timestamp(&Value::String(text.into())).is_err(),
                "{} accepted",
                text
            );
        }
    }

    #[test]
    fn short_row_is_an_error() {
        let response = parse(serde_json::json!({
            "jobComplete": true,
            "rows": [ { "f": [
                { "v": "t" }, { "v": "u" }, { "v": "1" }, { "v": null }, { "v": "5" }
            ]}]
        }));
        let err = response.into_page().unwrap_err();
        assert!(format!("{:#}", err).contains("5 cells"), "got: {:#}", err);
    }

    #[test]
    fn incomplete_response_parses_without_rows() {
        let response = parse(serde_json::json!({
            "jobComplete": false,
            "jobReference": { "jobId": "job_slow", "location": "EU" }
        }));
        assert!(!response.job_complete);
        assert!(response.rows.is_empty());
    }
}
