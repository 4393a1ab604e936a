//! Hub and client configuration
//!
//! Both configs can be built in code (`HubConfig::default().with_...`) or
//! loaded from YAML. Durations are written in milliseconds:
//!
//! ```yaml
//! listen_addr: "0.0.0.0:8881"
//! liveness_timeout_ms: 60000
//! write_deadline_ms: 10000
//! # heartbeat_period_ms defaults to 9/10 of the liveness timeout
//! queue_capacity: 256
//! delivery_policy: block
//! log_level: info
//! ```

use crate::traits::WsHubError;
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

impl From<ConfigError> for WsHubError {
    fn from(error: ConfigError) -> Self {
        WsHubError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_WRITE_DEADLINE: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONNECT_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(1);

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// What the router does when a bounded session queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Wait for space; stalls delivery to every later session in the same
    /// iteration
    #[default]
    Block,
    /// Skip the full session and log the drop
    DropWhenFull,
}

/// Hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Address the sample server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Maximum silence from a peer before its session is presumed dead
    #[serde(
        rename = "liveness_timeout_ms",
        with = "millis",
        default = "default_liveness_timeout"
    )]
    pub liveness_timeout: Duration,

    /// Deadline applied to each frame write
    #[serde(
        rename = "write_deadline_ms",
        with = "millis",
        default = "default_write_deadline"
    )]
    pub write_deadline: Duration,

    /// Heartbeat period; `None` derives 9/10 of the liveness timeout
    #[serde(rename = "heartbeat_period_ms", with = "opt_millis", default)]
    pub heartbeat_period: Option<Duration>,

    /// Outbound queue capacity per session; `None` = unbounded
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    #[serde(default)]
    pub delivery_policy: DeliveryPolicy,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            write_deadline: DEFAULT_WRITE_DEADLINE,
            heartbeat_period: None,
            queue_capacity: None,
            delivery_policy: DeliveryPolicy::Block,
            log_level: default_log_level(),
        }
    }
}

impl HubConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;

        if let Ok(addr) = std::env::var("WSHUB_LISTEN_ADDR") {
            info!("Overriding listen address from environment variable");
            config.listen_addr = addr;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text without validating
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    pub fn with_write_deadline(mut self, deadline: Duration) -> Self {
        self.write_deadline = deadline;
        self
    }

    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = Some(period);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_delivery_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.delivery_policy = policy;
        self
    }

    /// Effective heartbeat period
    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_period
            .unwrap_or_else(|| self.liveness_timeout * 9 / 10)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.liveness_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "liveness_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.write_deadline.is_zero() {
            return Err(ConfigError::ValidationError(
                "write_deadline_ms must be greater than 0".to_string(),
            ));
        }
        let heartbeat = self.heartbeat_period();
        if heartbeat.is_zero() || heartbeat >= self.liveness_timeout {
            return Err(ConfigError::ValidationError(
                "heartbeat_period_ms must be greater than 0 and less than liveness_timeout_ms"
                    .to_string(),
            ));
        }
        if self.queue_capacity == Some(0) {
            return Err(ConfigError::ValidationError(
                "queue_capacity must be greater than 0 when set".to_string(),
            ));
        }
        validate_log_level(&self.log_level)
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Hub configuration loaded:");
        info!("  Listen address: {}", self.listen_addr);
        info!("  Liveness timeout: {:?}", self.liveness_timeout);
        info!("  Write deadline: {:?}", self.write_deadline);
        info!("  Heartbeat period: {:?}", self.heartbeat_period());
        match self.queue_capacity {
            Some(capacity) => info!(
                "  Queue: bounded ({}), policy {:?}",
                capacity, self.delivery_policy
            ),
            None => info!("  Queue: unbounded"),
        }
        info!("  Log level: {}", self.log_level);
    }
}

/// Client connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Hub host and port, e.g. `localhost:8881`
    pub address: String,

    /// Request path, e.g. `/connect/0001`
    #[serde(default = "default_path")]
    pub path: String,

    /// Use `wss` instead of `ws`
    #[serde(default)]
    pub secure: bool,

    /// Fixed delay before each reconnect attempt
    #[serde(
        rename = "reconnect_period_ms",
        with = "millis",
        default = "default_reconnect_period"
    )]
    pub reconnect_period: Duration,

    /// Wait after sending the close frame on interrupt
    #[serde(
        rename = "close_grace_ms",
        with = "millis",
        default = "default_close_grace"
    )]
    pub close_grace: Duration,

    /// Deadline for a single outbound frame write; expiry drops the
    /// connection and schedules a reconnect
    #[serde(
        rename = "write_deadline_ms",
        with = "millis",
        default = "default_write_deadline"
    )]
    pub write_deadline: Duration,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            path: default_path(),
            secure: false,
            reconnect_period: DEFAULT_RECONNECT_PERIOD,
            close_grace: DEFAULT_CLOSE_GRACE,
            write_deadline: DEFAULT_WRITE_DEADLINE,
            log_level: default_log_level(),
        }
    }

    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: ClientConfig = serde_yaml::from_str(&yaml_content)?;

        if let Ok(addr) = std::env::var("WSHUB_SERVER_ADDR") {
            info!("Overriding server address from environment variable");
            config.address = addr;
        }

        config.validate()?;
        Ok(config)
    }

    /// Full websocket URL built from scheme, address and path
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        if self.path.starts_with('/') {
            format!("{}://{}{}", scheme, self.address, self.path)
        } else {
            format!("{}://{}/{}", scheme, self.address, self.path)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "address cannot be empty".to_string(),
            ));
        }
        if self.reconnect_period.is_zero() {
            return Err(ConfigError::ValidationError(
                "reconnect_period_ms must be greater than 0".to_string(),
            ));
        }
        if self.write_deadline.is_zero() {
            return Err(ConfigError::ValidationError(
                "write_deadline_ms must be greater than 0".to_string(),
            ));
        }
        validate_log_level(&self.log_level)
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Client configuration loaded:");
        info!("  URL: {}", self.url());
        info!("  Reconnect period: {:?}", self.reconnect_period);
        info!("  Close grace: {:?}", self.close_grace);
        info!("  Write deadline: {:?}", self.write_deadline);
        info!("  Log level: {}", self.log_level);
    }
}

fn validate_log_level(level: &str) -> Result<()> {
    if !VALID_LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "log_level must be one of: {}",
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

fn default_listen_addr() -> String {
    "0.0.0.0:8881".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_liveness_timeout() -> Duration {
    DEFAULT_LIVENESS_TIMEOUT
}

fn default_write_deadline() -> Duration {
    DEFAULT_WRITE_DEADLINE
}

fn default_reconnect_period() -> Duration {
    DEFAULT_RECONNECT_PERIOD
}

fn default_close_grace() -> Duration {
    DEFAULT_CLOSE_GRACE
}

fn default_log_level() -> String {
    "info".to_string()
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
