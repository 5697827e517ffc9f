use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub polling: PollingConfig,
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the game API
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

fn default_api_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Interval between faction attack polls (seconds)
    #[serde(default = "default_attack_interval")]
    pub attack_interval_secs: u64,
    /// Interval between user-level attack polls (seconds)
    #[serde(default = "default_user_attack_interval")]
    pub user_attack_interval_secs: u64,
    /// Interval between mission snapshot polls (seconds)
    #[serde(default = "default_mission_interval")]
    pub mission_interval_secs: u64,
    /// TTL of the advisory per-job poll lock (seconds)
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,
}

fn default_attack_interval() -> u64 {
    30
}

fn default_user_attack_interval() -> u64 {
    300
}

fn default_mission_interval() -> u64 {
    60
}

fn default_lock_ttl() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Base URL of the chat API used for channel posts and DMs
    pub webhook_base_url: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("api.timeout_secs", 15)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("WARDEN_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (WARDEN_API__BASE_URL, etc.)
            .add_source(
                Environment::with_prefix("WARDEN")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.api.base_url.is_empty() {
            errors.push("api.base_url must be set".to_string());
        }

        if self.notify.webhook_base_url.is_empty() {
            errors.push("notify.webhook_base_url must be set".to_string());
        }

        if self.polling.attack_interval_secs == 0 {
            errors.push("polling.attack_interval_secs must be positive".to_string());
        }

        if self.polling.mission_interval_secs == 0 {
            errors.push("polling.mission_interval_secs must be positive".to_string());
        }

        if self.polling.lock_ttl_secs == 0 {
            errors.push("polling.lock_ttl_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
