use realtime_channel::{ChannelConfig, Identity, Scope};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the realtime probe binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Realtime endpoint (`ws://` or `wss://`)
    pub url: String,
    pub user_id: String,

    /// Session token from .env (not in YAML)
    #[serde(skip)]
    pub token: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub channel: ChannelSettings,

    #[serde(default)]
    pub probe: ProbeSettings,
}

/// Channel tunables as they appear in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub heartbeat_interval_secs: u64,
    pub reconnect_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub open_timeout_secs: u64,
    pub outbound_queue_capacity: usize,
    pub event_buffer_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        let defaults = ChannelConfig::default();
        Self {
            heartbeat_interval_secs: defaults.heartbeat_interval.as_secs(),
            reconnect_attempts: defaults.reconnect_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            open_timeout_secs: defaults.open_timeout.as_secs(),
            outbound_queue_capacity: defaults.outbound_queue_capacity,
            event_buffer_capacity: defaults.event_buffer_capacity,
        }
    }
}

impl ChannelSettings {
    pub fn to_channel_config(&self) -> ChannelConfig {
        ChannelConfig::default()
            .with_heartbeat_interval(Duration::from_secs(self.heartbeat_interval_secs))
            .with_reconnect_attempts(self.reconnect_attempts)
            .with_backoff(
                Duration::from_millis(self.initial_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )
            .with_open_timeout(Duration::from_secs(self.open_timeout_secs))
            .with_queue_capacity(self.outbound_queue_capacity)
            .with_event_buffer_capacity(self.event_buffer_capacity)
    }
}

/// Optional outbound traffic generated by the probe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Send a `probe` envelope this often; disabled when absent
    pub interval_secs: Option<u64>,
    /// Workspace the probe envelopes are addressed to; global when absent
    pub workspace_id: Option<String>,
}

impl ProbeSettings {
    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn scope(&self) -> Scope {
        match &self.workspace_id {
            Some(id) => Scope::workspace(id.clone()),
            None => Scope::Global,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ProbeConfig {
    /// Load configuration from a YAML file and the environment
    ///
    /// `REALTIME_URL` and `REALTIME_TOKEN` override the file.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml_str(&yaml_content)?;

        config.apply_overrides(
            std::env::var("REALTIME_URL").ok(),
            std::env::var("REALTIME_TOKEN").ok(),
        );
        config.validate()?;

        Ok(config)
    }

    /// Parse YAML without consulting the environment or validating
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn apply_overrides(&mut self, url: Option<String>, token: Option<String>) {
        if let Some(url) = url {
            info!("Overriding realtime URL from environment variable");
            self.url = url;
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "url must start with ws:// or wss://, got '{}'",
                self.url
            )));
        }

        if self.user_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "user_id must not be empty".to_string(),
            ));
        }

        self.channel
            .to_channel_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn identity(&self) -> Identity {
        let identity = Identity::new(self.user_id.clone());
        match &self.token {
            Some(token) => identity.with_token(token.clone()),
            None => identity,
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        self.channel.to_channel_config()
    }
}
