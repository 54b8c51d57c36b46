use serde::{Deserialize, Serialize};
use tracing::{info, error};

/// Whether an edit's durable write must finish before the edit is broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteAckMode {
    /// Spawn the write and broadcast immediately
    FireAndForget,
    /// Await the write inside the dispatcher, then broadcast
    Acknowledged,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Database URL. Without one, history is kept in process memory.
    pub db_url: Option<String>,

    /// Number of history entries kept in memory per session
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_write_ack_mode")]
    pub write_ack_mode: WriteAckMode,

    /// Capacity of the dispatcher inbox
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            dotenvy::dotenv().ok();
        }

        Self::from_vars(std::env::vars())
    }

    /// Build configuration from an explicit set of variables
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        match envy::from_iter::<_, Config>(vars) {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Parsed CORS origins, empty when none are configured
    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            service_name: default_service_name(),
            db_url: None,
            history_limit: default_history_limit(),
            write_ack_mode: default_write_ack_mode(),
            command_queue_capacity: default_command_queue_capacity(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "colab-session".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_history_limit() -> usize {
    50
}

fn default_write_ack_mode() -> WriteAckMode {
    WriteAckMode::FireAndForget
}

fn default_command_queue_capacity() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.write_ack_mode, WriteAckMode::FireAndForget);
        assert_eq!(config.command_queue_capacity, 1024);
        assert!(config.db_url.is_none());
        assert!(config.is_development());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_vars(vars(&[
            ("PORT", "8080"),
            ("HISTORY_LIMIT", "10"),
            ("WRITE_ACK_MODE", "acknowledged"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
            ("ENVIRONMENT", "prod"),
        ]))
        .unwrap();
        assert_eq!(config.server_address(), "0.0.0.0:8080");
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.write_ack_mode, WriteAckMode::Acknowledged);
        assert_eq!(config.allowed_origins(), vec!["http://a.test", "http://b.test"]);
        assert!(!config.is_development());
    }

    #[test]
    fn rejects_unknown_write_mode() {
        assert!(Config::from_vars(vars(&[("WRITE_ACK_MODE", "eventually")])).is_err());
    }
}
