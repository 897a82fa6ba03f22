pub mod auth;
mod client;
pub mod types;

pub use auth::{AuthState, CredentialStore, TOKEN_REFRESH_INTERVAL, TokenManager, TokenSource};
pub use client::SheetsClient;

use crate::error::Result;
use async_trait::async_trait;
use types::{BatchRequest, Spreadsheet, ValueRange};

/// The remote Sheets service boundary. Every call authenticates with a bearer
/// access token; rate-limit violations surface as `AppError::RateLimited`.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    async fn get_spreadsheet(&self, access_token: &str, spreadsheet_id: &str)
    -> Result<Spreadsheet>;

    async fn batch_get_values(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        ranges: &[String],
    ) -> Result<Vec<ValueRange>>;

    async fn update_cell(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
        value: &str,
    ) -> Result<()>;

    async fn batch_update(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        requests: Vec<BatchRequest>,
    ) -> Result<()>;
}
