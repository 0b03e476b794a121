//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bearer-token settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Offline push provider settings.
    #[serde(default)]
    pub push: PushSettings,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vigil_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Bearer-token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret the token HMAC key is derived from. Must be overridden in
    /// production; the default exists so local development works out of
    /// the box.
    #[serde(default = "default_token_secret")]
    pub token_secret: String,

    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

/// Offline push provider configuration. Push is disabled unless both the
/// endpoint and the API key are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushSettings {
    /// Full URL of the provider's send endpoint.
    pub endpoint: Option<String>,

    /// Server API key for the provider.
    pub api_key: Option<String>,
}

impl PushSettings {
    /// Returns the client configuration when push is fully configured.
    pub fn client_config(&self) -> Option<vigil_push::PushConfig> {
        match (&self.endpoint, &self.api_key) {
            (Some(endpoint), Some(api_key)) => Some(vigil_push::PushConfig {
                endpoint: endpoint.clone(),
                api_key: api_key.clone(),
            }),
            _ => None,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "vigil.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_token_secret() -> String {
    "vigil-dev-secret".to_string()
}

fn default_token_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: default_token_secret(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VIGIL_HOST` overrides `server.host`
/// - `VIGIL_PORT` overrides `server.port`
/// - `VIGIL_DB_PATH` overrides `database.path`
/// - `VIGIL_LOG_LEVEL` overrides `logging.level`
/// - `VIGIL_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `VIGIL_TOKEN_SECRET` overrides `auth.token_secret`
/// - `VIGIL_PUSH_ENDPOINT` overrides `push.endpoint`
/// - `VIGIL_PUSH_API_KEY` overrides `push.api_key`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("VIGIL_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("VIGIL_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("VIGIL_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("VIGIL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("VIGIL_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(secret) = std::env::var("VIGIL_TOKEN_SECRET") {
        config.auth.token_secret = secret;
    }
    if let Ok(endpoint) = std::env::var("VIGIL_PUSH_ENDPOINT") {
        config.push.endpoint = Some(endpoint);
    }
    if let Ok(api_key) = std::env::var("VIGIL_PUSH_API_KEY") {
        config.push.api_key = Some(api_key);
    }

    Ok(config)
}
