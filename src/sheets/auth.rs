use crate::config::GoogleConfig;
use crate::error::{AppError, Result};
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, RedirectUrl, RefreshToken, Scope, StandardRevocableToken, TokenResponse, TokenUrl,
    basic::{
        BasicClient, BasicErrorResponse, BasicRevocationErrorResponse,
        BasicTokenIntrospectionResponse, BasicTokenResponse,
    },
};
use reqwest::redirect::Policy;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};
use url::Url;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Proactive refresh period. Google does not report a reliable TTL for these
/// tokens, so the bridge refreshes on a fixed timer instead of tracking expiry.
pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Ready,
    Failed,
}

/// Durable storage for credentials; called on every token state change.
pub trait CredentialStore: Send + Sync {
    fn save(&self, credentials: &GoogleConfig) -> Result<()>;
}

/// What the sync and mutation paths need from authentication: a token when
/// Ready, and a signal after out-of-band refreshes.
pub trait TokenSource: Send + Sync {
    /// The current access token, only while authentication is Ready.
    fn ready_token(&self) -> Option<String>;

    fn refreshed(&self) -> &Notify;
}

impl TokenSource for TokenManager {
    fn ready_token(&self) -> Option<String> {
        if self.is_ready() {
            self.access_token()
        } else {
            None
        }
    }

    fn refreshed(&self) -> &Notify {
        TokenManager::refreshed(self)
    }
}

// Type alias for the client when Auth and Token URLs are set
type ConfiguredClient = Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,    // HasAuthUrl
    EndpointNotSet, // HasDeviceAuthUrl
    EndpointNotSet, // HasIntrospectionUrl
    EndpointNotSet, // HasRevocationUrl
    EndpointSet,    // HasTokenUrl
>;

/// Owns the OAuth credential lifecycle: one-time code exchange, periodic
/// refresh, and status reporting. The only writer of access/refresh tokens.
pub struct TokenManager {
    client: ConfiguredClient,
    http_client: reqwest::Client,
    credentials: Mutex<GoogleConfig>,
    state: Mutex<AuthState>,
    store: Box<dyn CredentialStore>,
    refreshed: Notify,
}

impl TokenManager {
    pub fn new(credentials: GoogleConfig, store: Box<dyn CredentialStore>) -> Result<Self> {
        let auth_url = AuthUrl::new(GOOGLE_AUTH_URL.to_string())
            .map_err(|e| AppError::Auth(format!("Invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
            .map_err(|e| AppError::Auth(format!("Invalid token URL: {}", e)))?;

        let mut client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
            .set_client_secret(ClientSecret::new(credentials.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url);

        if !credentials.redirect_uri.is_empty() {
            client = client.set_redirect_uri(
                RedirectUrl::new(credentials.redirect_uri.clone())
                    .map_err(|e| AppError::Auth(format!("Invalid redirect URL: {}", e)))?,
            );
        }

        let http_client = reqwest::ClientBuilder::new()
            .redirect(Policy::none())
            .build()
            .map_err(|e| AppError::Auth(format!("Failed to build reqwest client: {}", e)))?;

        Ok(Self {
            client,
            http_client,
            credentials: Mutex::new(credentials),
            state: Mutex::new(AuthState::Unauthenticated),
            store,
            refreshed: Notify::new(),
        })
    }

    pub fn state(&self) -> AuthState {
        *self.state.lock().unwrap()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == AuthState::Ready
    }

    pub fn access_token(&self) -> Option<String> {
        self.credentials.lock().unwrap().access_token.clone()
    }

    pub fn has_client(&self) -> bool {
        let credentials = self.credentials.lock().unwrap();
        !credentials.client_id.is_empty() && !credentials.client_secret.is_empty()
    }

    /// Notified after every successful refresh; the scheduler listens and
    /// polls out of band.
    pub fn refreshed(&self) -> &Notify {
        &self.refreshed
    }

    /// Consent URL for the configured OAuth client, or None when no client
    /// credentials are configured.
    pub fn consent_url(&self) -> Option<Url> {
        if !self.has_client() {
            return None;
        }

        let (url, _csrf) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(SHEETS_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        Some(url)
    }

    /// Wipe stored tokens and persist the cleared credentials.
    pub fn clear_tokens(&self) -> Result<()> {
        let snapshot = {
            let mut credentials = self.credentials.lock().unwrap();
            credentials.access_token = None;
            credentials.refresh_token = None;
            credentials.clear_tokens = false;
            credentials.clone()
        };
        *self.state.lock().unwrap() = AuthState::Unauthenticated;
        self.store.save(&snapshot)?;
        info!("Cleared stored Google tokens");
        Ok(())
    }

    /// Authenticate with Google: refresh first, then the one-time code
    /// exchange. Exactly one of the two can reach Ready.
    #[instrument(name = "Authenticating to Google", skip_all)]
    pub async fn authenticate(&self) -> bool {
        *self.state.lock().unwrap() = AuthState::Authenticating;

        if self.refresh().await {
            return true;
        }
        if self.exchange_code().await {
            return true;
        }

        *self.state.lock().unwrap() = AuthState::Failed;
        false
    }

    /// Refresh the access token with the stored refresh token.
    ///
    /// Failure leaves the refresh token and prior state untouched; the next
    /// scheduled refresh retries.
    pub async fn refresh(&self) -> bool {
        let refresh_token = {
            let credentials = self.credentials.lock().unwrap();
            if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
                return false;
            }
            match &credentials.refresh_token {
                Some(token) if !token.is_empty() => token.clone(),
                _ => return false,
            }
        };

        debug!("Attempting to refresh access token");

        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(&self.http_client)
            .await;

        match token_result {
            Ok(token) => {
                let snapshot = {
                    let mut credentials = self.credentials.lock().unwrap();
                    credentials.access_token = Some(token.access_token().secret().clone());
                    credentials.clone()
                };
                *self.state.lock().unwrap() = AuthState::Ready;
                if let Err(e) = self.store.save(&snapshot) {
                    warn!("Failed to persist refreshed credentials: {}", e);
                }
                debug!("Token refresh successful");
                self.refreshed.notify_one();
                true
            }
            Err(e) => {
                warn!("Token refresh failed: {:?}", e);
                false
            }
        }
    }

    /// Exchange the one-time authorization code for a token pair.
    ///
    /// The code is consumed either way: a bad code is cleared so it is never
    /// retried.
    pub async fn exchange_code(&self) -> bool {
        let code = {
            let credentials = self.credentials.lock().unwrap();
            if credentials.code.is_empty() {
                return false;
            }
            credentials.code.clone()
        };

        debug!("Attempting to exchange authorization code");

        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(&self.http_client)
            .await;

        match token_result {
            Ok(token) => {
                let snapshot = {
                    let mut credentials = self.credentials.lock().unwrap();
                    credentials.access_token = Some(token.access_token().secret().clone());
                    if let Some(refresh) = token.refresh_token() {
                        credentials.refresh_token = Some(refresh.secret().clone());
                    }
                    credentials.code.clear();
                    credentials.clone()
                };
                *self.state.lock().unwrap() = AuthState::Ready;
                if let Err(e) = self.store.save(&snapshot) {
                    warn!("Failed to persist exchanged credentials: {}", e);
                }
                info!("Authorization code exchanged");
                true
            }
            Err(e) => {
                warn!("Error exchanging code: {:?}", e);
                let snapshot = {
                    let mut credentials = self.credentials.lock().unwrap();
                    credentials.code.clear();
                    credentials.clone()
                };
                if let Err(e) = self.store.save(&snapshot) {
                    warn!("Failed to persist credentials: {}", e);
                }
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub(crate) struct RecordingStore {
        pub saved: Arc<Mutex<Vec<GoogleConfig>>>,
    }

    impl CredentialStore for RecordingStore {
        fn save(&self, credentials: &GoogleConfig) -> Result<()> {
            self.saved.lock().unwrap().push(credentials.clone());
            Ok(())
        }
    }

    /// Fixed token source for scheduler and gateway tests.
    pub(crate) struct StaticTokens {
        token: Option<String>,
        notify: Notify,
    }

    impl StaticTokens {
        pub(crate) fn ready(token: &str) -> Self {
            Self {
                token: Some(token.to_string()),
                notify: Notify::new(),
            }
        }

        pub(crate) fn unauthenticated() -> Self {
            Self {
                token: None,
                notify: Notify::new(),
            }
        }
    }

    impl TokenSource for StaticTokens {
        fn ready_token(&self) -> Option<String> {
            self.token.clone()
        }

        fn refreshed(&self) -> &Notify {
            &self.notify
        }
    }

    pub(crate) fn mock_credentials() -> GoogleConfig {
        GoogleConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:8001".to_string(),
            code: String::new(),
            access_token: Some("access".to_string()),
            refresh_token: Some("refresh".to_string()),
            clear_tokens: false,
        }
    }
}
