//! Server configuration
//!
//! Loaded from a TOML file or built from defaults, then overridden from the
//! environment. A `.env` file in the working directory is read first when present.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use callbroker_core::BrokerConfig;

use crate::error::{Result, ServerError};
use crate::logging::{parse_log_level, LoggingConfig};

pub const ENV_BIND_ADDR: &str = "CALLBROKER_BIND_ADDR";
pub const ENV_CALL_PATH: &str = "CALLBROKER_CALL_PATH";
pub const ENV_RECORD_STORE_URL: &str = "SERVERAPP_HOST";
pub const ENV_RECORDING_PATH: &str = "RECORDING_PATH";
pub const ENV_LOG_LEVEL: &str = "CALLBROKER_LOG_LEVEL";
pub const ENV_BACKEND_TIMEOUT_MS: &str = "CALLBROKER_BACKEND_TIMEOUT_MS";

/// Paths served by the HTTP surface itself
const RESERVED_PATHS: [&str; 2] = ["/stats", "/health"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// WebSocket upgrade path for signaling connections
    pub call_path: String,
    /// Allow any origin, method and header
    pub cors_permissive: bool,
    /// Base URL of the external record store; notifications are off when unset
    pub record_store_url: Option<String>,
    pub log_level: String,
    pub log_json: bool,
    /// Include source file and line in log records
    pub log_file_info: bool,
    /// Log span open and close events
    pub log_spans: bool,
    pub broker: BrokerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            call_path: "/call".to_string(),
            cors_permissive: true,
            record_store_url: None,
            log_level: "info".to_string(),
            log_json: false,
            log_file_info: false,
            log_spans: false,
            broker: BrokerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ServerError::config(format!("invalid TOML: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServerError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.load_env()?;
        Ok(config)
    }

    /// Read `.env` if present, then apply environment overrides and validate
    pub fn load_env(&mut self) -> Result<()> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ServerError::config(format!("invalid .env file: {}", e))),
        }
        self.apply_env(|key| std::env::var(key).ok())?;
        self.validate()
    }

    /// Apply overrides from `lookup`, keyed by the `ENV_*` names
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            self.bind_addr = addr;
        }
        if let Some(path) = lookup(ENV_CALL_PATH) {
            self.call_path = path;
        }
        if let Some(url) = lookup(ENV_RECORD_STORE_URL).filter(|u| !u.trim().is_empty()) {
            self.record_store_url = Some(url);
        }
        if let Some(template) = lookup(ENV_RECORDING_PATH) {
            self.broker.recording.uri_template = placeholder_template(&template);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(timeout) = lookup(ENV_BACKEND_TIMEOUT_MS) {
            self.broker.backend_timeout_ms = timeout.trim().parse().map_err(|_| {
                ServerError::config(format!("{} must be an integer, got {:?}", ENV_BACKEND_TIMEOUT_MS, timeout))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr
            .parse::<SocketAddr>()
            .map_err(|_| ServerError::config(format!("invalid bind_addr {:?}", self.bind_addr)))?;

        if !self.call_path.starts_with('/') {
            return Err(ServerError::config("call_path must start with '/'"));
        }
        if RESERVED_PATHS.contains(&self.call_path.as_str()) {
            return Err(ServerError::config(format!(
                "call_path {} is reserved",
                self.call_path
            )));
        }

        parse_log_level(&self.log_level)?;
        self.broker.validate()?;
        Ok(())
    }

    pub fn logging(&self) -> Result<LoggingConfig> {
        let mut logging = LoggingConfig::new(parse_log_level(&self.log_level)?);
        if self.log_json {
            logging = logging.with_json();
        }
        if self.log_file_info {
            logging = logging.with_file_info();
        }
        if self.log_spans {
            logging = logging.with_spans();
        }
        Ok(logging)
    }
}

/// Accept printf-style recording paths (`/rec/%s_%d.webm`) as well as named
/// placeholders; the `%s` slot is the call id and `%d` the unix timestamp.
fn placeholder_template(raw: &str) -> String {
    if raw.contains('{') {
        return raw.to_string();
    }
    raw.replacen("%s", "{call_id}", 1)
        .replacen("%d", "{timestamp}", 1)
}
