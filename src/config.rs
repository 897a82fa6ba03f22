use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const CONFIG_DIR_PREFIX: &str = "sheetbridge";

/// Minimum poll interval; anything lower is clamped up.
const MIN_POLL_INTERVAL_SECS: f64 = 0.1;

fn default_poll_interval() -> f64 {
    1.5
}

fn default_http_port() -> u16 {
    8787
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub google: GoogleConfig,
    pub poll: PollConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Google OAuth app credentials plus the token state this bridge manages.
///
/// `code` is the one-time authorization code pasted from the consent redirect;
/// it is consumed (and cleared) on the first exchange attempt. Tokens are
/// written back to the config file whenever they change.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When set, stored tokens are wiped before the next authentication.
    #[serde(default)]
    pub clear_tokens: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PollConfig {
    /// Space-separated spreadsheet IDs, in the order index references resolve.
    pub spreadsheet_ids: String,
    /// Refer to spreadsheets by position in `spreadsheet_ids` rather than ID.
    #[serde(default)]
    pub reference_by_index: bool,
    #[serde(default = "default_poll_interval")]
    pub interval_secs: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            spreadsheet_ids: String::new(),
            reference_by_index: false,
            interval_secs: default_poll_interval(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

impl PollConfig {
    pub fn spreadsheet_ids(&self) -> Vec<String> {
        self.spreadsheet_ids
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Effective poll interval in milliseconds, clamped to the minimum.
    pub fn interval_ms(&self) -> u64 {
        let secs = self.interval_secs.max(MIN_POLL_INTERVAL_SECS);
        (secs * 1000.0) as u64
    }

    /// Resolve a spreadsheet reference to an ID.
    ///
    /// In reference-by-index mode the input is a position in the configured
    /// ID list, so reordering that list re-points previously saved
    /// references. That is inherent to index addressing and left as-is.
    pub fn resolve_spreadsheet(&self, reference: &str) -> Result<String> {
        if self.reference_by_index {
            let index: usize = reference.parse().map_err(|_| {
                AppError::Resolve(format!("'{reference}' is not a spreadsheet index"))
            })?;
            self.spreadsheet_ids()
                .get(index)
                .cloned()
                .ok_or_else(|| AppError::Resolve(format!("no spreadsheet at index {index}")))
        } else if reference.is_empty() {
            Err(AppError::Resolve("empty spreadsheet ID".to_string()))
        } else {
            Ok(reference.to_string())
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file()?;

        if !config_path.exists() {
            return Err(AppError::Config(format!(
                "Config file not found at {:?}. Please create one.",
                config_path
            )));
        }

        let contents = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        if config.google.client_id.is_empty() || config.google.client_secret.is_empty() {
            return Err(AppError::Config(
                "Google client_id and client_secret must be set in config file".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file()?;
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(&config_path, contents)?;
        Ok(())
    }

    fn xdg_dirs() -> xdg::BaseDirectories {
        xdg::BaseDirectories::with_prefix(CONFIG_DIR_PREFIX)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        let xdg_dirs = Self::xdg_dirs();
        xdg_dirs
            .place_config_file("config.toml")
            .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = Config {
            google: GoogleConfig {
                client_id: "test_id".to_string(),
                client_secret: "test_secret".to_string(),
                redirect_uri: "http://localhost:8001".to_string(),
                code: String::new(),
                access_token: Some("at".to_string()),
                refresh_token: None,
                clear_tokens: false,
            },
            poll: PollConfig {
                spreadsheet_ids: "sheet-a sheet-b".to_string(),
                reference_by_index: true,
                interval_secs: 2.0,
            },
            http: HttpConfig::default(),
        };

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(config.google, deserialized.google);
        assert_eq!(
            config.poll.spreadsheet_ids,
            deserialized.poll.spreadsheet_ids
        );
        assert!(deserialized.poll.reference_by_index);
    }

    #[test]
    fn test_interval_is_clamped() {
        let poll = PollConfig {
            interval_secs: 0.01,
            ..Default::default()
        };
        assert_eq!(poll.interval_ms(), 100);

        let poll = PollConfig {
            interval_secs: 1.5,
            ..Default::default()
        };
        assert_eq!(poll.interval_ms(), 1500);
    }

    #[test]
    fn test_resolve_by_id() {
        let poll = PollConfig {
            spreadsheet_ids: "alpha beta".to_string(),
            reference_by_index: false,
            ..Default::default()
        };
        assert_eq!(poll.resolve_spreadsheet("gamma").unwrap(), "gamma");
        assert!(poll.resolve_spreadsheet("").is_err());
    }

    #[test]
    fn test_resolve_by_index() {
        let poll = PollConfig {
            spreadsheet_ids: "alpha beta".to_string(),
            reference_by_index: true,
            ..Default::default()
        };
        assert_eq!(poll.resolve_spreadsheet("0").unwrap(), "alpha");
        assert_eq!(poll.resolve_spreadsheet("1").unwrap(), "beta");
        assert!(poll.resolve_spreadsheet("2").is_err());
        assert!(poll.resolve_spreadsheet("beta").is_err());
    }
}
