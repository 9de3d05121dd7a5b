//! Application configuration
//!
//! Sources, later overrides earlier:
//! 1. Built-in defaults
//! 2. The YAML file passed with `--config`
//! 3. Environment variables prefixed with `SARAFAN_`, `__` separating
//!    nested keys (e.g. `SARAFAN_TELEGRAM__TOKEN`, `SARAFAN_DATABASE__PATH`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SARAFAN_";

/// Prefix Telegram uses for supergroup and channel ids.
const CHANNEL_ID_PREFIX: &str = "-100";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    Missing(PathBuf),

    #[error("Failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
pub struct TelegramConfig {
    #[serde(deserialize_with = "deserialize_secret")]
    pub token: SecretString,
    /// Staff group id, with or without the `-100` prefix
    #[serde(deserialize_with = "deserialize_channel")]
    pub staff_channel: String,
    /// Bot username used in referral links, without `@`
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
    /// Custom Bot API server, e.g. a local `telegram-bot-api` instance
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
    pub connect_retries: usize,
    pub connect_backoff_secs: u64,
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "sarafan.sqlite".to_string(),
            max_connections: 10,
            connect_retries: 5,
            connect_backoff_secs: 2,
            busy_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub check_interval_secs: u64,
    pub threshold_hours: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30 * 60,
            threshold_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for one store call, pool checkout included
    pub store_secs: u64,
    /// Upper bound for one send/edit on the notification channel
    pub notify_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            store_secs: 10,
            notify_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

fn default_bot_username() -> String {
    "sarafan_bot".to_string()
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Accepts the channel id as a YAML/env number or as a string.
fn deserialize_channel<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawChannel {
        Id(i64),
        Text(String),
    }

    Ok(match RawChannel::deserialize(deserializer)? {
        RawChannel::Id(id) => id.to_string(),
        RawChannel::Text(text) => text,
    })
}

impl AppConfig {
    /// Loads and validates the configuration.
    ///
    /// The file must exist; environment variables only override it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let config: AppConfig = Figment::new()
            .merge(Serialized::default("database", DatabaseConfig::default()))
            .merge(Serialized::default("reminders", ReminderConfig::default()))
            .merge(Serialized::default("timeouts", TimeoutConfig::default()))
            .merge(Serialized::default("log", LogConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Invalid("telegram.token is empty".into()));
        }
        self.telegram.staff_chat_id()?;
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be positive".into()));
        }
        if self.reminders.threshold_hours <= 0 {
            return Err(ConfigError::Invalid("reminders.threshold_hours must be positive".into()));
        }
        Ok(())
    }
}

impl TelegramConfig {
    /// Staff channel id with the `-100` prefix applied.
    pub fn staff_chat_id(&self) -> Result<i64, ConfigError> {
        normalize_channel_id(&self.staff_channel)
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_secs(self.connect_backoff_secs)
    }
}

impl ReminderConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn threshold(&self) -> chrono::Duration {
        chrono::Duration::hours(self.threshold_hours)
    }
}

impl TimeoutConfig {
    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_secs)
    }

    pub fn notify(&self) -> Duration {
        Duration::from_secs(self.notify_secs)
    }
}

/// Adds the `-100` supergroup prefix when it is missing.
pub fn normalize_channel_id(raw: &str) -> Result<i64, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::Invalid("telegram.staff_channel is empty".into()));
    }

    let full = if raw.starts_with(CHANNEL_ID_PREFIX) {
        raw.to_string()
    } else {
        format!("{CHANNEL_ID_PREFIX}{}", raw.trim_start_matches('-'))
    };

    full.parse::<i64>()
        .map_err(|e| ConfigError::Invalid(format!("telegram.staff_channel {raw:?}: {e}")))
}
