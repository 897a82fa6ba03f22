//! Self-rescheduling polling loop that keeps the [`SheetCache`] fresh.
//!
//! Spreadsheet metadata changes rarely and costs a request per spreadsheet, so
//! it is fetched on one cycle in four; cell values are fetched every cycle.
//! Per-spreadsheet fetches within a cycle run concurrently and settle
//! individually, so one spreadsheet's failure never blocks the others.
//! Successive cycles are strictly sequential: the next timer is armed only
//! after every request in the current cycle has settled.

use crate::cache::SheetCache;
use crate::config::PollConfig;
use crate::ratelimit::{RateLimiter, RequestKind};
use crate::sheets::{SheetsApi, TokenSource};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

const METADATA_PHASES: u8 = 4;

pub struct SyncScheduler<A, T> {
    api: Arc<A>,
    cache: Arc<SheetCache>,
    rate: Arc<RateLimiter>,
    tokens: Arc<T>,
    poll: PollConfig,
    changed: watch::Sender<u64>,
    phase: u8,
}

impl<A, T> SyncScheduler<A, T>
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
        changed: watch::Sender<u64>,
    ) -> Self {
        Self {
            api,
            cache,
            rate,
            tokens,
            poll,
            changed,
            phase: 0,
        }
    }

    /// One poll cycle. Skips fetching when unauthenticated or nothing is
    /// configured; the phase advances either way.
    pub async fn tick(&mut self) {
        let spreadsheet_ids = self.poll.spreadsheet_ids();

        if let Some(token) = self.tokens.ready_token()
            && !spreadsheet_ids.is_empty()
        {
            // Metadata is throttled to one cycle in four; values fetches need
            // the metadata's sheet titles, so on a metadata cycle they wait
            // for all metadata requests to settle first.
            if self.phase == 0 {
                join_all(
                    spreadsheet_ids
                        .iter()
                        .map(|id| self.fetch_metadata(&token, id)),
                )
                .await;
            }

            join_all(
                spreadsheet_ids
                    .iter()
                    .map(|id| self.fetch_values(&token, id)),
            )
            .await;

            self.changed.send_modify(|generation| *generation += 1);
        }

        self.phase = (self.phase + 1) % METADATA_PHASES;
    }

    async fn fetch_metadata(&self, token: &str, spreadsheet_id: &str) {
        self.rate.record(RequestKind::Read);

        match self.api.get_spreadsheet(token, spreadsheet_id).await {
            Ok(metadata) => self.cache.set_metadata(spreadsheet_id, metadata),
            Err(e) => {
                debug!(spreadsheet_id, "Metadata fetch failed: {}", e);
                if e.is_rate_limited() {
                    self.rate.record(RequestKind::Exceeded);
                }
            }
        }
    }

    async fn fetch_values(&self, token: &str, spreadsheet_id: &str) {
        self.rate.record(RequestKind::Read);

        // No cached metadata yet means no sheet titles to build ranges from;
        // the next metadata cycle fills that in.
        let Some(titles) = self.cache.sheet_titles(spreadsheet_id) else {
            return;
        };

        // Quote titles so the API cannot mistake one for a cell reference
        let ranges: Vec<String> = titles.iter().map(|title| format!("'{}'", title)).collect();

        match self
            .api
            .batch_get_values(token, spreadsheet_id, &ranges)
            .await
        {
            Ok(value_ranges) => self.cache.set_values(spreadsheet_id, value_ranges),
            Err(e) => {
                debug!(spreadsheet_id, "Values fetch failed: {}", e);
                if e.is_rate_limited() {
                    self.rate.record(RequestKind::Exceeded);
                }
            }
        }
    }

    /// Delay until the next cycle: the configured interval stretched by the
    /// current backoff, minus the time the cycle itself took. Never negative.
    fn next_delay(&self, elapsed: Duration) -> Duration {
        let backoff_ms = self.rate.update_backoff();
        let elapsed_ms = elapsed.as_millis() as u64;
        let target_ms = self.poll.interval_ms().saturating_add(backoff_ms);
        Duration::from_millis(target_ms.saturating_sub(elapsed_ms))
    }

    /// Run the poll loop until shutdown. A token-refresh poke starts the next
    /// cycle early; shutdown is checked before every rearm so no timer
    /// outlives teardown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let started = Instant::now();
            self.tick().await;

            if *shutdown.borrow() {
                break;
            }

            let delay = self.next_delay(started.elapsed());
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = self.tokens.refreshed().notified() => {
                    debug!("Token refreshed, polling out of band");
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Sync scheduler stopped");
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::MockSheetsApi;
    use super::*;
    use crate::cache::test_helpers::{mock_spreadsheet, mock_values};
    use crate::sheets::auth::test_helpers::StaticTokens;

    fn poll_config(ids: &str) -> PollConfig {
        PollConfig {
            spreadsheet_ids: ids.to_string(),
            reference_by_index: false,
            interval_secs: 1.5,
        }
    }

    fn scheduler(
        api: MockSheetsApi,
        tokens: StaticTokens,
        ids: &str,
    ) -> (
        SyncScheduler<MockSheetsApi, StaticTokens>,
        Arc<MockSheetsApi>,
        Arc<SheetCache>,
        Arc<RateLimiter>,
        watch::Receiver<u64>,
    ) {
        let api = Arc::new(api);
        let cache = Arc::new(SheetCache::new());
        let rate = Arc::new(RateLimiter::new());
        let (changed_tx, changed_rx) = watch::channel(0);
        let scheduler = SyncScheduler::new(
            api.clone(),
            cache.clone(),
            rate.clone(),
            Arc::new(tokens),
            poll_config(ids),
            changed_tx,
        );
        (scheduler, api, cache, rate, changed_rx)
    }

    fn scores_api() -> MockSheetsApi {
        let mut api = MockSheetsApi::default();
        api.spreadsheets
            .insert("S1".to_string(), mock_spreadsheet("S1", "Scores", &[(7, "Sheet1")]));
        api.values.insert(
            "S1".to_string(),
            vec![mock_values("Sheet1!A1:B1", &[&["10", "20"]])],
        );
        api
    }

    #[tokio::test]
    async fn test_metadata_fetched_one_cycle_in_four() {
        let (mut scheduler, api, _cache, _rate, _changed) =
            scheduler(scores_api(), StaticTokens::ready("token"), "S1");

        for _ in 0..4 {
            scheduler.tick().await;
        }

        assert_eq!(api.metadata_calls.lock().unwrap().len(), 1);
        assert_eq!(api.values_calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_tick_populates_cache_and_notifies() {
        let (mut scheduler, _api, cache, _rate, changed) =
            scheduler(scores_api(), StaticTokens::ready("token"), "S1");

        scheduler.tick().await;

        assert_eq!(
            cache.lookup_cell_value("S1", "Sheet1!B1"),
            Some("20".to_string())
        );
        assert_eq!(*changed.borrow(), 1);
    }

    #[tokio::test]
    async fn test_values_ranges_are_quoted_sheet_titles() {
        let (mut scheduler, api, _cache, _rate, _changed) =
            scheduler(scores_api(), StaticTokens::ready("token"), "S1");

        scheduler.tick().await;

        let calls = api.values_calls.lock().unwrap();
        assert_eq!(calls[0].1, vec!["'Sheet1'".to_string()]);
    }

    #[tokio::test]
    async fn test_unauthenticated_tick_skips_fetching() {
        let (mut scheduler, api, _cache, _rate, changed) =
            scheduler(scores_api(), StaticTokens::unauthenticated(), "S1");

        scheduler.tick().await;

        assert!(api.metadata_calls.lock().unwrap().is_empty());
        assert!(api.values_calls.lock().unwrap().is_empty());
        assert_eq!(*changed.borrow(), 0);
    }

    #[tokio::test]
    async fn test_one_spreadsheet_failure_does_not_block_others() {
        let (mut scheduler, _api, cache, _rate, _changed) =
            scheduler(scores_api(), StaticTokens::ready("token"), "bad S1");

        scheduler.tick().await;

        assert_eq!(
            cache.lookup_cell_value("S1", "Sheet1!A1"),
            Some("10".to_string())
        );
        assert_eq!(cache.sheet_titles("bad"), None);
    }

    #[tokio::test]
    async fn test_reads_and_rate_limit_errors_are_recorded() {
        let mut api = scores_api();
        api.rate_limited = true;
        let (mut scheduler, _api, _cache, rate, _changed) =
            scheduler(api, StaticTokens::ready("token"), "S1");

        scheduler.tick().await;

        let totals = rate.totals();
        // Both fetches record a read; only the metadata fetch reaches the API
        // (no cached titles yet), so one 429 lands in the window
        assert_eq!(totals.read, 2);
        assert_eq!(totals.exceeded, 1);
        assert_eq!(rate.update_backoff(), 20);
    }

    #[tokio::test]
    async fn test_next_delay_subtracts_elapsed_and_adds_backoff() {
        let (scheduler, _api, _cache, rate, _changed) =
            scheduler(scores_api(), StaticTokens::ready("token"), "S1");

        // Instant cycle, no backoff: the full interval remains
        assert_eq!(
            scheduler.next_delay(Duration::ZERO),
            Duration::from_millis(1500)
        );

        // A slow cycle is subtracted from the interval
        assert_eq!(
            scheduler.next_delay(Duration::from_millis(600)),
            Duration::from_millis(900)
        );

        // Backoff stretches the interval
        rate.record(RequestKind::Exceeded);
        assert_eq!(
            scheduler.next_delay(Duration::ZERO),
            Duration::from_millis(1520)
        );

        // A cycle slower than interval plus backoff clamps to zero
        assert_eq!(scheduler.next_delay(Duration::from_secs(60)), Duration::ZERO);
    }
}
