//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: WORKLOG_, nested keys separated by `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/worklog-audit/{service_name}/config.toml
//! 4. System directory: /etc/worklog-audit/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audit::sanitize::{DEFAULT_MAX_TEXT_LENGTH, DEFAULT_MAX_USER_AGENT_LENGTH};
use crate::error::Result;

const ENV_PREFIX: &str = "WORKLOG_";
const CONFIG_DIR_PREFIX: &str = "worklog-audit";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Audit trail configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Database configuration (optional, used by the Postgres sink)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Log level (trace, debug, info, warn, error) or a full `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Which sink persists flushed batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// In-process buffer, for development and tests
    Memory,
    /// Structured `tracing` events on the `audit` target
    #[default]
    Tracing,
    /// PostgreSQL table (requires the `database` feature)
    Postgres,
}

/// Audit trail configuration
///
/// Loaded from the `[audit]` section of config.toml or `WORKLOG_AUDIT__*`
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable audit logging (default: true)
    ///
    /// When disabled the middleware passes requests through without a scope,
    /// so every ambient lookup returns `None` and logging is a no-op.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum length of free-text fields and metadata strings, in characters
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// Maximum length of user agent strings, in characters
    #[serde(default = "default_max_user_agent_length")]
    pub max_user_agent_length: usize,

    /// Replace the last IPv4 octet / IPv6 segment before persisting
    #[serde(default)]
    pub mask_ip_addresses: bool,

    /// Reuse a valid inbound correlation header instead of minting a new id
    #[serde(default)]
    pub trust_correlation_header: bool,

    /// Header carrying the correlation id across chained requests
    #[serde(default = "default_correlation_header")]
    pub correlation_header: String,

    /// Routes that never get an audit scope (default: ["/health", "/ready", "/metrics"])
    #[serde(default = "default_excluded_routes")]
    pub excluded_routes: Vec<String>,

    /// Sink used for flushed batches
    #[serde(default)]
    pub sink: SinkKind,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_text_length: default_max_text_length(),
            max_user_agent_length: default_max_user_agent_length(),
            mask_ip_addresses: false,
            trust_correlation_header: false,
            correlation_header: default_correlation_header(),
            excluded_routes: default_excluded_routes(),
            sink: SinkKind::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_text_length() -> usize {
    DEFAULT_MAX_TEXT_LENGTH
}

fn default_max_user_agent_length() -> usize {
    DEFAULT_MAX_USER_AGENT_LENGTH
}

fn default_correlation_header() -> String {
    "x-correlation-id".to_string()
}

fn default_excluded_routes() -> Vec<String> {
    vec![
        "/health".to_string(),
        "/ready".to_string(),
        "/metrics".to_string(),
    ]
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is inferred from the binary name.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| CONFIG_DIR_PREFIX.to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::named(service_name)));

        // Lowest priority first so higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses XDG directories and loads directly from the given path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service
    ///
    /// Returns paths in priority order (highest first).
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(CONFIG_DIR_PREFIX);
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc")
                .join(CONFIG_DIR_PREFIX)
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    fn named(service_name: &str) -> Self {
        let mut config = Self::default();
        config.service.name = service_name.to_string();
        config
    }

    /// Get database URL
    pub fn database_url(&self) -> Option<&str> {
        self.database.as_ref().map(|db| db.url.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: CONFIG_DIR_PREFIX.to_string(),
                log_level: default_log_level(),
                environment: default_environment(),
            },
            audit: AuditConfig::default(),
            database: None,
        }
    }
}
