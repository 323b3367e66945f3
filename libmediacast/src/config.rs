//! Configuration management for Mediacast

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::{WebhookConfig, MAX_PRIORITY, MIN_PRIORITY};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

/// Settings injected into [`JobQueue`](crate::queue::JobQueue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of jobs in `processing` at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Age after which non-processing jobs are purged by cleanup
    #[serde(
        default = "default_retention",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub retention: Duration,

    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    #[serde(default = "default_priority")]
    pub default_priority: u8,

    /// Buffer size of the lifecycle event channel per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            retention: default_retention(),
            default_max_retries: default_max_retries(),
            default_priority: default_priority(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl QueueConfig {
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Interval between queue polls, idle or not
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub poll_interval: Duration,

    /// Upper bound on a single publish call; unset means no bound
    #[serde(
        default,
        deserialize_with = "deserialize_optional_duration",
        serialize_with = "serialize_optional_duration"
    )]
    pub publish_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            publish_timeout: None,
        }
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_retention() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_max_retries() -> u32 {
    3
}

fn default_priority() -> u8 {
    5
}

fn default_event_capacity() -> usize {
    100
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_duration<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

fn serialize_optional_duration<S>(
    duration: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(d) => serialize_duration(d, serializer),
        None => serializer.serialize_none(),
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from the default location, falling back to
    /// built-in defaults when no file exists there
    pub fn load_or_default() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.queue.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue(
                "queue.max_concurrent must be at least 1".to_string(),
            )
            .into());
        }

        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.queue.default_priority) {
            return Err(ConfigError::InvalidValue(format!(
                "queue.default_priority must be between {} and {}",
                MIN_PRIORITY, MAX_PRIORITY
            ))
            .into());
        }

        for webhook in &self.webhooks {
            if webhook.verify_token.is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "webhooks.{}.verify_token",
                    webhook.platform
                ))
                .into());
            }
        }

        Ok(())
    }
}

/// Resolve the configuration file path (XDG config dir unless overridden)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("MEDIACAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("mediacast").join("config.toml"))
}
