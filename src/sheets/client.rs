//! Sheets v4 REST client: bearer-token auth per call, polite pacing with
//! jitter, bounded retry with backoff on rate-limit responses.

use crate::config::{ClientConfig, SheetsConfig};
use crate::sheets::{oauth, SheetsStore, ValueInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::RngExt;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("HTTP {status} from Sheets API: {body}")]
    Api { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("retries exhausted for {url}")]
    RetriesExhausted { url: String },
}

impl SheetsError {
    /// 429 and 503 are the API's back-off signals; everything else fails fast.
    fn is_retryable(&self) -> bool {
        match self {
            SheetsError::Api { status, .. } => *status == 429 || *status == 503,
            SheetsError::Transport(_) => true,
            SheetsError::RetriesExhausted { .. } => false,
        }
    }
}

pub struct GoogleSheetsClient {
    http: reqwest::Client,
    spreadsheet_id: String,
    key_path: String,
    pacing: ClientConfig,
}

impl GoogleSheetsClient {
    pub fn new(sheets: &SheetsConfig, pacing: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(pacing.timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            spreadsheet_id: sheets.spreadsheet_id.clone(),
            key_path: sheets.service_account_json_path.clone(),
            pacing: pacing.clone(),
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/{}/values/{}", API_BASE, self.spreadsheet_id, range)
    }

    /// Sleep for the configured delay + random jitter before touching the API.
    async fn polite_delay(&self) {
        let jitter = rand::rng().random_range(0..=self.pacing.jitter_ms);
        sleep(Duration::from_millis(self.pacing.request_delay_ms + jitter)).await;
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        token: &str,
    ) -> Result<Value, SheetsError> {
        let mut req = self
            .http
            .request(method.clone(), url)
            .query(query)
            .bearer_auth(token);
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SheetsError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json().await?)
    }

    /// One API call with pacing and bounded retry.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let token = oauth::fetch_access_token(&self.http, &self.key_path)
            .await
            .context("Sheets API authentication failed")?;

        self.polite_delay().await;

        let mut last_err = SheetsError::RetriesExhausted {
            url: url.to_string(),
        };

        for attempt in 1..=(self.pacing.max_retries + 1) {
            debug!("{} {} (attempt {})", method, url, attempt);

            match self.attempt(&method, url, query, body, &token).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    let backoff =
                        Duration::from_millis(self.pacing.request_delay_ms * (attempt as u64));
                    warn!("{} {} failed on attempt {}: {}", method, url, attempt, e);
                    sleep(backoff).await;
                    last_err = e;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_err).with_context(|| format!("All retries exhausted for {}", url))
    }
}

#[async_trait]
impl SheetsStore for GoogleSheetsClient {
    async fn sheet_titles(&self) -> Result<Vec<String>> {
        let url = format!("{}/{}", API_BASE, self.spreadsheet_id);
        let resp = self
            .execute(Method::GET, &url, &[("fields", "sheets.properties.title")], None)
            .await?;

        let titles = resp["sheets"]
            .as_array()
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s["properties"]["title"].as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(titles)
    }

    async fn add_sheet(&self, title: &str) -> Result<()> {
        let url = format!("{}/{}:batchUpdate", API_BASE, self.spreadsheet_id);
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": { "title": title }
                }
            }]
        });

        self.execute(Method::POST, &url, &[], Some(&body))
            .await
            .with_context(|| format!("Could not create tab '{}'", title))?;
        Ok(())
    }

    async fn read_rows(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let resp = self
            .execute(Method::GET, &self.values_url(range), &[], None)
            .await
            .with_context(|| format!("Read of range '{}' failed", range))?;

        let rows = resp["values"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| c.as_str().map(String::from).unwrap_or_else(|| c.to_string()))
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn write_rows(
        &self,
        range: &str,
        values: Vec<Vec<String>>,
        input: ValueInput,
    ) -> Result<()> {
        let body = json!({
            "values": values,
            "majorDimension": "ROWS",
        });

        self.execute(
            Method::PUT,
            &self.values_url(range),
            &[("valueInputOption", input.as_param())],
            Some(&body),
        )
        .await
        .with_context(|| format!("Write to range '{}' failed", range))?;
        Ok(())
    }

    async fn append_rows(
        &self,
        range: &str,
        values: Vec<Vec<String>>,
        input: ValueInput,
    ) -> Result<()> {
        let url = format!("{}:append", self.values_url(range));
        let body = json!({
            "values": values,
        });

        self.execute(
            Method::POST,
            &url,
            &[
                ("valueInputOption", input.as_param()),
                ("insertDataOption", "INSERT_ROWS"),
            ],
            Some(&body),
        )
        .await
        .with_context(|| format!("Append to '{}' failed", range))?;
        Ok(())
    }

    async fn row_count(&self, tab: &str) -> Result<u32> {
        // The bare tab title addresses its whole used range.
        let rows = self.read_rows(tab).await?;
        Ok(rows.len() as u32)
    }
}
