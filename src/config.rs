//! Runtime configuration, read from `YUNO_*` environment variables.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::api::{HttpApiClient, MockApiClient, OnboardingApi};
use crate::error::ConfigError;
use crate::onboarding::SessionConfig;

pub const DEFAULT_API_BASE_URL: &str = "https://api.helloyuno.com";
pub const DEFAULT_DASHBOARD_URL: &str = "https://dashboard.helloyuno.com";
pub const DEFAULT_WIDGET_CDN: &str = "https://cdn.helloyuno.com";

/// Onboarding configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingConfig {
    /// Root of the REST backend.
    pub api_base_url: String,
    /// Serve canned responses instead of calling the backend.
    pub mock_api: bool,
    /// Scraping status poll interval.
    pub poll_interval: Duration,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Scopes session-lifetime entries in the store.
    pub session_id: String,
    /// Where a finished signup is sent.
    pub dashboard_url: String,
    /// Widget CDN; only the mock API uses it.
    pub widget_cdn: String,
    /// Per-request timeout. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Directory for daily-rotated log files, if any.
    pub log_dir: Option<PathBuf>,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            mock_api: true,
            poll_interval: Duration::from_secs(3),
            db_path: PathBuf::from("./data/yuno-onboarding.db"),
            session_id: "default".to_string(),
            dashboard_url: DEFAULT_DASHBOARD_URL.to_string(),
            widget_cdn: DEFAULT_WIDGET_CDN.to_string(),
            request_timeout: None,
            log_dir: None,
        }
    }
}

impl OnboardingConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the environment.
    ///
    /// Mock mode is on when `YUNO_MOCK_API=true` or no API base URL is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_base_url = var("YUNO_API_BASE_URL");
        let mock_api = match var("YUNO_MOCK_API") {
            Some(raw) => parse_bool("YUNO_MOCK_API", &raw)? || api_base_url.is_none(),
            None => api_base_url.is_none(),
        };

        let poll_interval = match var("YUNO_POLL_INTERVAL_SECS") {
            Some(raw) => {
                let secs = parse_secs("YUNO_POLL_INTERVAL_SECS", &raw)?;
                if secs == 0 {
                    return Err(invalid("YUNO_POLL_INTERVAL_SECS", "must be at least 1"));
                }
                Duration::from_secs(secs)
            }
            None => defaults.poll_interval,
        };

        let request_timeout = var("YUNO_REQUEST_TIMEOUT_SECS")
            .map(|raw| parse_secs("YUNO_REQUEST_TIMEOUT_SECS", &raw))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            api_base_url: api_base_url.unwrap_or(defaults.api_base_url),
            mock_api,
            poll_interval,
            db_path: var("YUNO_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            session_id: var("YUNO_SESSION_ID").unwrap_or(defaults.session_id),
            dashboard_url: var("YUNO_DASHBOARD_URL").unwrap_or(defaults.dashboard_url),
            widget_cdn: var("YUNO_WIDGET_CDN").unwrap_or(defaults.widget_cdn),
            request_timeout,
            log_dir: var("YUNO_LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: self.poll_interval,
        }
    }

    /// Build the API client this configuration selects.
    pub fn api_client(&self) -> Result<Arc<dyn OnboardingApi>, ConfigError> {
        if self.mock_api {
            info!("Using mock onboarding API");
            return Ok(Arc::new(MockApiClient::new(self.widget_cdn.clone())));
        }
        info!(base_url = %self.api_base_url, "Using onboarding API");
        let client = HttpApiClient::new(self.api_base_url.clone(), self.request_timeout)?;
        Ok(Arc::new(client))
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse()
        .map_err(|_| invalid(key, format!("expected whole seconds, got {raw:?}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(key, format!("expected true or false, got {raw:?}"))),
    }
}
