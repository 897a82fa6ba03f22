use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("OAuth2 authentication error: {0}")]
    Auth(String),

    #[error("Google Sheets API error: {0}")]
    Sheets(String),

    #[error("Rate limit exceeded (429): {0}")]
    RateLimited(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resolution error: {0}")]
    Resolve(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the remote service signalled a rate-limit violation.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::RateLimited(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
