//! Validates and issues spreadsheet write operations.
//!
//! Every operation is fire-and-forget: inputs are validated, the spreadsheet
//! reference resolved, and the request issued; failures are logged and never
//! propagate to the caller. Button-grid callers are not built to await
//! results, so completion is observable only through logs and rate
//! accounting.

use crate::a1;
use crate::cache::SheetCache;
use crate::config::PollConfig;
use crate::error::AppError;
use crate::ratelimit::{RateLimiter, RequestKind};
use crate::sheets::types::{BatchRequest, Dimension};
use crate::sheets::{SheetsApi, TokenSource};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
pub enum Adjustment {
    #[default]
    Set,
    Increase,
    Decrease,
}

pub struct MutationGateway<A, T> {
    api: Arc<A>,
    cache: Arc<SheetCache>,
    rate: Arc<RateLimiter>,
    tokens: Arc<T>,
    poll: PollConfig,
}

/// Format an adjusted value the way a spreadsheet shows it: integral results
/// without a trailing `.0`.
fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Resolve a row/column bound as either a direct one-based number or a column
/// letter, to a zero-based index.
fn resolve_bound(input: &str) -> Option<i64> {
    let input = input.trim();
    match input.parse::<i64>() {
        Ok(n) if n >= 1 => Some(n - 1),
        Ok(_) => None,
        Err(_) => a1::column_letter_to_index(input).map(|index| index as i64),
    }
}

impl<A, T> MutationGateway<A, T>
where
    A: SheetsApi,
    T: TokenSource,
{
    pub fn new(
        api: Arc<A>,
        cache: Arc<SheetCache>,
        rate: Arc<RateLimiter>,
        tokens: Arc<T>,
        poll: PollConfig,
    ) -> Self {
        Self {
            api,
            cache,
            rate,
            tokens,
            poll,
        }
    }

    fn resolve(&self, spreadsheet: &str) -> Option<(String, String)> {
        let token = match self.tokens.ready_token() {
            Some(token) => token,
            None => {
                warn!("Not authenticated, dropping operation");
                return None;
            }
        };
        match self.poll.resolve_spreadsheet(spreadsheet) {
            Ok(id) => Some((token, id)),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    fn sheet_id(&self, spreadsheet_id: &str, sheet_title: &str) -> Option<i64> {
        match self.cache.sheet_id_by_title(spreadsheet_id, sheet_title) {
            Some(sheet_id) => Some(sheet_id),
            None => {
                warn!(spreadsheet_id, sheet_title, "Invalid sheet name");
                None
            }
        }
    }

    async fn send_batch(&self, token: &str, spreadsheet_id: &str, request: BatchRequest) -> bool {
        self.rate.record(RequestKind::Write);
        match self
            .api
            .batch_update(token, spreadsheet_id, vec![request])
            .await
        {
            Ok(()) => true,
            Err(e) => {
                self.log_write_error(e);
                false
            }
        }
    }

    fn log_write_error(&self, e: AppError) {
        warn!("Write failed: {}", e);
        if e.is_rate_limited() {
            self.rate.record(RequestKind::Exceeded);
        }
    }

    /// Set a cell to a value verbatim.
    pub async fn set_cell(&self, spreadsheet: &str, cell: &str, value: &str) {
        self.adjust_cell(Adjustment::Set, spreadsheet, cell, value)
            .await
    }

    /// Set, increase, or decrease a cell.
    ///
    /// Increase/Decrease read the current value from the cache and parse both
    /// it and the delta as numbers; either failing to parse aborts the whole
    /// operation with no write.
    pub async fn adjust_cell(&self, adjustment: Adjustment, spreadsheet: &str, cell: &str, value: &str) {
        if !cell.contains('!') {
            warn!(cell, "Cell reference must be in Sheet!A1 notation");
            return;
        }
        let Some((token, spreadsheet_id)) = self.resolve(spreadsheet) else {
            return;
        };

        let new_value = match adjustment {
            Adjustment::Set => value.to_string(),
            Adjustment::Increase | Adjustment::Decrease => {
                let Ok(delta) = value.parse::<f64>() else {
                    warn!("Unable to adjust cell: {value} is not a number");
                    return;
                };
                let Some(current) = self.cache.lookup_cell_value(&spreadsheet_id, cell) else {
                    warn!(cell, "Unable to adjust cell: no cached value");
                    return;
                };
                let Ok(current) = current.parse::<f64>() else {
                    warn!("Unable to adjust cell: {current} is not a number");
                    return;
                };
                match adjustment {
                    Adjustment::Increase => format_value(current + delta),
                    Adjustment::Decrease => format_value(current - delta),
                    Adjustment::Set => unreachable!(),
                }
            }
        };

        debug!(spreadsheet_id, cell, new_value, "Adjusting cell");
        self.rate.record(RequestKind::Write);
        match self
            .api
            .update_cell(&token, &spreadsheet_id, cell, &new_value)
            .await
        {
            Ok(()) => info!("{} successfully changed to {}", cell, new_value),
            Err(e) => self.log_write_error(e),
        }
    }

    /// Append a new sheet with the given title.
    pub async fn add_sheet(&self, spreadsheet: &str, title: &str) {
        if title.is_empty() {
            warn!("Sheet name must not be empty");
            return;
        }
        let Some((token, spreadsheet_id)) = self.resolve(spreadsheet) else {
            return;
        };

        if self
            .send_batch(&token, &spreadsheet_id, BatchRequest::add_sheet(title))
            .await
        {
            info!("Sheet {} added", title);
        }
    }

    /// Duplicate a sheet by title, inserting the copy at the end of the
    /// current sheet list.
    pub async fn duplicate_sheet(&self, spreadsheet: &str, source_title: &str, new_title: &str) {
        let Some((token, spreadsheet_id)) = self.resolve(spreadsheet) else {
            return;
        };
        let Some(source_sheet_id) = self.cache.sheet_id_by_title(&spreadsheet_id, source_title)
        else {
            warn!("Unable to find sheet {} to duplicate", source_title);
            return;
        };
        let insert_index = self.cache.sheet_count(&spreadsheet_id).unwrap_or(0) as i64;

        if self
            .send_batch(
                &token,
                &spreadsheet_id,
                BatchRequest::duplicate_sheet(source_sheet_id, insert_index, new_title),
            )
            .await
        {
            info!("Sheet {} duplicated as {}", source_title, new_title);
        }
    }

    /// Clear every user-entered value on a sheet.
    pub async fn clear_sheet(&self, spreadsheet: &str, sheet_title: &str) {
        let Some((token, spreadsheet_id)) = self.resolve(spreadsheet) else {
            return;
        };
        let Some(sheet_id) = self.sheet_id(&spreadsheet_id, sheet_title) else {
            return;
        };

        if self
            .send_batch(&token, &spreadsheet_id, BatchRequest::clear_sheet(sheet_id))
            .await
        {
            info!("Sheet {} cleared", sheet_title);
        }
    }

    /// Delete a run of rows or columns. Bounds are one-based numbers or
    /// column letters; the stop bound is non-inclusive.
    pub async fn delete_row_column(
        &self,
        spreadsheet: &str,
        sheet_title: &str,
        dimension: Dimension,
        start: &str,
        stop: &str,
    ) {
        let Some((token, spreadsheet_id)) = self.resolve(spreadsheet) else {
            return;
        };
        let Some(sheet_id) = self.sheet_id(&spreadsheet_id, sheet_title) else {
            return;
        };

        let (Some(start), Some(stop)) = (resolve_bound(start), resolve_bound(stop)) else {
            warn!("Invalid start and stop indexes");
            return;
        };
        if start >= stop {
            warn!(start, stop, "Invalid start and stop indexes");
            return;
        }

        self.send_batch(
            &token,
            &spreadsheet_id,
            BatchRequest::delete_dimension(sheet_id, dimension, start, stop),
        )
        .await;
    }
}
