//! Wires the components together and owns every long-lived task.
//!
//! All timers (rate-window rotation, token refresh, poll loop) are explicit
//! tasks held here and cancelled through one shutdown signal; teardown awaits
//! in-flight work before returning, so nothing keeps running after
//! [`Bridge::shutdown`].

use crate::cache::SheetCache;
use crate::config::{Config, GoogleConfig};
use crate::error::Result;
use crate::http::HttpServer;
use crate::mutation::MutationGateway;
use crate::ratelimit::RateLimiter;
use crate::sheets::{CredentialStore, SheetsClient, TOKEN_REFRESH_INTERVAL, TokenManager};
use crate::sync::SyncScheduler;
use crate::vars;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Persists credentials by rewriting the TOML config file.
pub struct TomlStore {
    config: Mutex<Config>,
}

impl TomlStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

impl CredentialStore for TomlStore {
    fn save(&self, credentials: &GoogleConfig) -> Result<()> {
        let mut config = self.config.lock().unwrap();
        config.google = credentials.clone();
        config.save()
    }
}

pub struct Bridge {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    http: HttpServer,
    gateway: Arc<MutationGateway<SheetsClient, TokenManager>>,
    tokens: Arc<TokenManager>,
    cache: Arc<SheetCache>,
}

impl Bridge {
    pub async fn start(config: Config) -> Result<Bridge> {
        let rate = Arc::new(RateLimiter::new());
        let cache = Arc::new(SheetCache::new());
        let api = Arc::new(SheetsClient::new());

        let store = TomlStore::new(config.clone());
        let tokens = Arc::new(TokenManager::new(config.google.clone(), Box::new(store))?);

        if config.google.clear_tokens {
            tokens.clear_tokens()?;
        }

        if tokens.authenticate().await {
            info!("Authenticated to Google");
        } else {
            warn!("Authentication failed; polling is paused until credentials are fixed");
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (changed_tx, changed_rx) = watch::channel(0u64);
        let mut tasks = Vec::new();

        tasks.push(Self::spawn_rate_rotation(
            rate.clone(),
            shutdown_rx.clone(),
        ));
        tasks.push(Self::spawn_token_refresh(
            tokens.clone(),
            shutdown_rx.clone(),
        ));
        tasks.push(Self::spawn_variables(
            cache.clone(),
            rate.clone(),
            changed_rx,
            shutdown_rx.clone(),
        ));

        let scheduler = SyncScheduler::new(
            api.clone(),
            cache.clone(),
            rate.clone(),
            tokens.clone(),
            config.poll.clone(),
            changed_tx,
        );
        tasks.push(tokio::spawn(scheduler.run(shutdown_rx)));

        let gateway = Arc::new(MutationGateway::new(
            api,
            cache.clone(),
            rate,
            tokens.clone(),
            config.poll,
        ));

        let http = HttpServer::spawn(
            config.http.port,
            cache.clone(),
            gateway.clone(),
            tokens.consent_url(),
        )?;

        Ok(Bridge {
            shutdown,
            tasks,
            http,
            gateway,
            tokens,
            cache,
        })
    }

    pub fn gateway(&self) -> Arc<MutationGateway<SheetsClient, TokenManager>> {
        self.gateway.clone()
    }

    pub fn cache(&self) -> Arc<SheetCache> {
        self.cache.clone()
    }

    pub fn tokens(&self) -> Arc<TokenManager> {
        self.tokens.clone()
    }

    fn spawn_rate_rotation(
        rate: Arc<RateLimiter>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => rate.rotate(),
                }
            }
        })
    }

    fn spawn_token_refresh(
        tokens: Arc<TokenManager>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            // First refresh only after a full period; authentication already
            // ran at startup
            let start = tokio::time::Instant::now() + TOKEN_REFRESH_INTERVAL;
            let mut ticker = tokio::time::interval_at(start, TOKEN_REFRESH_INTERVAL);
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        tokens.refresh().await;
                    }
                }
            }
        })
    }

    fn spawn_variables(
        cache: Arc<SheetCache>,
        rate: Arc<RateLimiter>,
        mut changed: watch::Receiver<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    result = changed.changed() => {
                        if result.is_err() {
                            break;
                        }
                        let variables = vars::export(&cache, &rate);
                        debug!(count = variables.len(), "Variables refreshed");
                    }
                }
            }
        })
    }

    /// Signal every task to stop and wait for in-flight work to settle.
    pub async fn shutdown(self) {
        debug!("Shutting down bridge");
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        self.http.shutdown().await;
        info!("Bridge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpConfig, PollConfig};

    #[tokio::test]
    async fn test_start_and_shutdown_without_credentials() {
        // No refresh token and no code: authentication fails locally without
        // touching the network, and every task still tears down cleanly.
        let config = Config {
            google: GoogleConfig::default(),
            poll: PollConfig::default(),
            http: HttpConfig { port: 0 },
        };

        let bridge = Bridge::start(config).await.unwrap();
        assert!(!bridge.tokens().is_ready());
        assert!(bridge.cache().summaries().is_empty());
        bridge.shutdown().await;
    }
}
