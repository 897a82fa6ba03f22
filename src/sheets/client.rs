use super::SheetsApi;
use super::types::{BatchGetResponse, BatchRequest, Spreadsheet, ValueRange};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::json;
use tracing::instrument;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// REST client for the Sheets v4 API. All calls authenticate with the bearer
/// access token supplied per request, so a token refresh never invalidates an
/// existing client.
pub struct SheetsClient {
    client: Client,
    base_url: String,
}

impl Default for SheetsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetsClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: SHEETS_BASE_URL.to_string(),
        }
    }

    async fn check(response: Response, context: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited(body));
        }
        Err(AppError::Sheets(format!(
            "{}: {} - {}",
            context, status, body
        )))
    }
}

#[async_trait]
impl SheetsApi for SheetsClient {
    #[instrument(name = "Fetching spreadsheet metadata", skip(self, access_token))]
    async fn get_spreadsheet(&self, access_token: &str, spreadsheet_id: &str) -> Result<Spreadsheet> {
        let url = format!("{}/{}", self.base_url, spreadsheet_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::check(response, "Failed to get spreadsheet").await?;
        Ok(response.json().await?)
    }

    #[instrument(name = "Fetching sheet values", skip(self, access_token, ranges))]
    async fn batch_get_values(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        ranges: &[String],
    ) -> Result<Vec<ValueRange>> {
        let url = format!("{}/{}/values:batchGet", self.base_url, spreadsheet_id);
        let query: Vec<(&str, &str)> = ranges.iter().map(|r| ("ranges", r.as_str())).collect();

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await?;

        let response = Self::check(response, "Failed to batch get values").await?;
        let body: BatchGetResponse = response.json().await?;
        Ok(body.value_ranges)
    }

    #[instrument(name = "Updating cell", skip(self, access_token, value))]
    async fn update_cell(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
        value: &str,
    ) -> Result<()> {
        let url = format!("{}/{}/values/{}", self.base_url, spreadsheet_id, range);

        let body = json!({
            "range": range,
            "values": [[value]],
        });

        let response = self
            .client
            .put(&url)
            .bearer_auth(access_token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .await?;

        Self::check(response, "Failed to update cell").await?;
        Ok(())
    }

    #[instrument(name = "Batch updating spreadsheet", skip(self, access_token, requests))]
    async fn batch_update(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        requests: Vec<BatchRequest>,
    ) -> Result<()> {
        let url = format!("{}/{}:batchUpdate", self.base_url, spreadsheet_id);

        let body = json!({
            "requests": requests,
            "includeSpreadsheetInResponse": false,
            "responseIncludeGridData": false,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        Self::check(response, "Failed to batch update").await?;
        Ok(())
    }
}
