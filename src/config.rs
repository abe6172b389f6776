//! read client configuration from a file, the environment, or explicit values

use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::errors::Error;

pub enum ConfigLocation {
    File(String),
    Env,
    Values(ClientConfig),
}

#[derive(Clone, Debug, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default = "default_auth_failure_statuses")]
    pub auth_failure_statuses: Vec<u16>,
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
    #[serde(default = "default_credential_service")]
    pub credential_service: String,
    #[serde(default = "default_refresh_loop_threshold")]
    pub refresh_loop_threshold: u32,
    #[serde(default = "default_refresh_loop_window_ms")]
    pub refresh_loop_window_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_follow_redirects")]
    pub follow_redirects: bool,
}

fn default_auth_failure_statuses() -> Vec<u16> {
    vec![401, 403]
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

fn default_credential_service() -> String {
    "default".to_string()
}

fn default_refresh_loop_threshold() -> u32 {
    5
}

fn default_refresh_loop_window_ms() -> u64 {
    1000
}

fn default_user_agent() -> String {
    concat!("api-dispatch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_follow_redirects() -> bool {
    true
}

impl ClientConfig {
    /// Configuration with every optional field at its default.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_failure_statuses: default_auth_failure_statuses(),
            auth_scheme: default_auth_scheme(),
            credential_service: default_credential_service(),
            refresh_loop_threshold: default_refresh_loop_threshold(),
            refresh_loop_window_ms: default_refresh_loop_window_ms(),
            user_agent: default_user_agent(),
            timeout_secs: None,
            follow_redirects: default_follow_redirects(),
        }
    }

    pub fn from_file(path: &str) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// # ENV Vars
    /// * `API_DISPATCH_BASE_URL` - Base URL relative endpoints are resolved against (required)
    /// * `API_DISPATCH_AUTH_FAILURE_STATUSES` - Comma separated status codes, e.g. `401,403`
    /// * `API_DISPATCH_AUTH_SCHEME` - Authorization scheme, defaults to `Bearer`
    /// * `API_DISPATCH_CREDENTIAL_SERVICE` - Credential store service key
    /// * `API_DISPATCH_REFRESH_LOOP_THRESHOLD` - Refresh attempts allowed inside one window
    /// * `API_DISPATCH_REFRESH_LOOP_WINDOW_MS` - Loop detection window in milliseconds
    /// * `API_DISPATCH_TIMEOUT_SECS` - Per-request timeout
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("API_DISPATCH_BASE_URL")
            .map_err(|_| Error::Config("Missing API_DISPATCH_BASE_URL env var".to_string()))?;
        let mut config = ClientConfig::new(base_url);
        if let Ok(raw) = std::env::var("API_DISPATCH_AUTH_FAILURE_STATUSES") {
            config.auth_failure_statuses = parse_statuses(&raw)?;
        }
        if let Ok(scheme) = std::env::var("API_DISPATCH_AUTH_SCHEME") {
            config.auth_scheme = scheme;
        }
        if let Ok(service) = std::env::var("API_DISPATCH_CREDENTIAL_SERVICE") {
            config.credential_service = service;
        }
        if let Some(threshold) = parse_env_number::<u32>("API_DISPATCH_REFRESH_LOOP_THRESHOLD")? {
            config.refresh_loop_threshold = threshold;
        }
        if let Some(window) = parse_env_number::<u64>("API_DISPATCH_REFRESH_LOOP_WINDOW_MS")? {
            config.refresh_loop_window_ms = window;
        }
        config.timeout_secs = parse_env_number("API_DISPATCH_TIMEOUT_SECS")?;
        config.validate()?;
        Ok(config)
    }

    pub fn base_url(&self) -> Result<Url, Error> {
        Url::parse(&self.base_url).map_err(|e| {
            Error::Config(format!("Invalid base URL '{}': {}", self.base_url, e))
        })
    }

    pub fn refresh_loop_window(&self) -> Duration {
        Duration::from_millis(self.refresh_loop_window_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<(), Error> {
        self.base_url()?;
        if self.refresh_loop_threshold == 0 {
            return Err(Error::Config(
                "refresh_loop_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn read_config(loc: ConfigLocation) -> Result<ClientConfig, Error> {
    let config = match loc {
        ConfigLocation::File(path) => ClientConfig::from_file(&path)?,
        ConfigLocation::Env => ClientConfig::from_env()?,
        ConfigLocation::Values(config) => {
            config.validate()?;
            config
        }
    };
    Ok(config)
}

fn parse_statuses(raw: &str) -> Result<Vec<u16>, Error> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>().map_err(|_| {
                Error::Config(format!(
                    "Invalid status '{}' in API_DISPATCH_AUTH_FAILURE_STATUSES",
                    s
                ))
            })
        })
        .collect()
}

fn parse_env_number<T: FromStr>(var: &str) -> Result<Option<T>, Error> {
    match std::env::var(var) {
        Ok(raw) => parse_number(var, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

/// Out-of-range values are rejected rather than truncated.
fn parse_number<T: FromStr>(var: &str, raw: &str) -> Result<T, Error> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("Invalid {} env var: '{}'", var, raw)))
}
