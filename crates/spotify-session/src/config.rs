//! Session configuration
//!
//! Precedence: env vars > config file > defaults. The client identifier
//! comes from the deployment environment (`SPOTIFY_CLIENT_ID`); its
//! absence is deliberately not an error here — login is the point where a
//! missing client id becomes fatal, not process start.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use spotify_auth::constants::{API_BASE, AUTHORIZE_ENDPOINT, TOKEN_ENDPOINT};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Orchestrator and endpoint configuration.
///
/// The timeouts are tuning constants, not protocol requirements: they must
/// exceed a typical successful round trip and must not stall the UI
/// indefinitely. Endpoints default to the real Spotify service and are
/// overridable so tests can point at local mocks.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Public OAuth client identifier. Optional until login time.
    pub client_id: Option<String>,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub api_base: String,
    /// Window the silent startup token check is raced against.
    pub startup_timeout: Duration,
    /// Window for the post-authentication user-profile fetch.
    pub profile_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            authorize_endpoint: AUTHORIZE_ENDPOINT.into(),
            token_endpoint: TOKEN_ENDPOINT.into(),
            api_base: API_BASE.into(),
            startup_timeout: Duration::from_secs(8),
            profile_timeout: Duration::from_secs(5),
        }
    }
}

/// On-disk shape of the config file. Everything optional; defaults apply.
#[derive(Debug, Deserialize)]
struct FileConfig {
    client_id: Option<String>,
    startup_timeout_secs: Option<u64>,
    profile_timeout_secs: Option<u64>,
}

impl SessionConfig {
    /// Defaults overlaid with the `SPOTIFY_CLIENT_ID` env var.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(id) = std::env::var("SPOTIFY_CLIENT_ID") {
            if !id.is_empty() {
                config.client_id = Some(id);
            }
        }
        config
    }

    /// Load from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&contents)?;

        let mut config = Self::default();
        config.client_id = file.client_id;
        if let Some(secs) = file.startup_timeout_secs {
            config.startup_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.profile_timeout_secs {
            config.profile_timeout = Duration::from_secs(secs);
        }

        if config.startup_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "startup_timeout_secs must be greater than 0".into(),
            ));
        }
        if config.profile_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "profile_timeout_secs must be greater than 0".into(),
            ));
        }

        if let Ok(id) = std::env::var("SPOTIFY_CLIENT_ID") {
            if !id.is_empty() {
                config.client_id = Some(id);
            }
        }
        Ok(config)
    }
}
