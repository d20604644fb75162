//! Demo configuration.
//!
//! Provides configuration for the broker connection, the workflow simulator
//! and the subscriber. Configuration is loaded from environment variables
//! with defaults suitable for running the demo locally.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Top-level configuration for the demo process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Broker connection settings.
    pub connection: ConnectionConfig,

    /// Workflow simulator settings.
    pub simulation: SimulationConfig,

    /// Subscriber settings.
    pub subscriber: SubscriberConfig,
}

impl DemoConfig {
    /// Load every section from the environment.
    pub fn from_env() -> Self {
        Self {
            connection: ConnectionConfig::from_env(),
            simulation: SimulationConfig::from_env(),
            subscriber: SubscriberConfig::from_env(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()?;
        self.simulation.validate()?;
        self.subscriber.validate()
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Broker URL (e.g., "memory://local").
    pub url: String,

    /// Message VPN name.
    pub message_vpn: String,

    /// Client username.
    pub username: String,

    /// Client password.
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Maximum subscriptions a single session may hold.
    pub max_subscriptions: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "memory://local".to_string(),
            message_vpn: "default".to_string(),
            username: "demo".to_string(),
            password: None,
            max_subscriptions: 100,
        }
    }
}

impl ConnectionConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BROKER_URL`: Broker URL (default: memory://local)
    /// - `BROKER_VPN`: Message VPN (default: default)
    /// - `BROKER_USERNAME`: Username (default: demo)
    /// - `BROKER_PASSWORD`: Password
    /// - `BROKER_MAX_SUBSCRIPTIONS`: Per-session subscription limit (default: 100)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            url: std::env::var("BROKER_URL").unwrap_or(default.url),
            message_vpn: std::env::var("BROKER_VPN").unwrap_or(default.message_vpn),
            username: std::env::var("BROKER_USERNAME").unwrap_or(default.username),
            password: std::env::var("BROKER_PASSWORD").ok(),
            max_subscriptions: env_parse("BROKER_MAX_SUBSCRIPTIONS")
                .unwrap_or(default.max_subscriptions),
        }
    }

    /// Validate the connection settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::invalid("BROKER_URL", "must not be empty"));
        }
        Ok(())
    }
}

/// Workflow simulator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Time between simulation ticks in milliseconds.
    pub tick_interval_ms: u64,

    /// Delay before a placed order's payment is settled, in milliseconds.
    pub payment_delay_ms: u64,

    /// Probability that a payment is authorized.
    pub payment_success_rate: f64,

    /// Stock level at or below which `LowStock` fires.
    pub low_stock_threshold: u32,

    /// Smallest random stock delta (inclusive).
    pub stock_delta_min: i32,

    /// Largest random stock delta (inclusive).
    pub stock_delta_max: i32,

    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5000,
            payment_delay_ms: 2000,
            payment_success_rate: 0.9,
            low_stock_threshold: 10,
            stock_delta_min: -10,
            stock_delta_max: 20,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SIM_TICK_INTERVAL_MS` (default: 5000)
    /// - `SIM_PAYMENT_DELAY_MS` (default: 2000)
    /// - `SIM_PAYMENT_SUCCESS_RATE` (default: 0.9)
    /// - `SIM_LOW_STOCK_THRESHOLD` (default: 10)
    /// - `SIM_STOCK_DELTA_MIN` (default: -10)
    /// - `SIM_STOCK_DELTA_MAX` (default: 20)
    /// - `SIM_SEED`: RNG seed (default: random)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            tick_interval_ms: env_parse("SIM_TICK_INTERVAL_MS").unwrap_or(default.tick_interval_ms),
            payment_delay_ms: env_parse("SIM_PAYMENT_DELAY_MS").unwrap_or(default.payment_delay_ms),
            payment_success_rate: env_parse("SIM_PAYMENT_SUCCESS_RATE")
                .unwrap_or(default.payment_success_rate),
            low_stock_threshold: env_parse("SIM_LOW_STOCK_THRESHOLD")
                .unwrap_or(default.low_stock_threshold),
            stock_delta_min: env_parse("SIM_STOCK_DELTA_MIN").unwrap_or(default.stock_delta_min),
            stock_delta_max: env_parse("SIM_STOCK_DELTA_MAX").unwrap_or(default.stock_delta_max),
            seed: env_parse("SIM_SEED"),
        }
    }

    /// Tick interval as a Duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Payment settlement delay as a Duration.
    pub fn payment_delay(&self) -> Duration {
        Duration::from_millis(self.payment_delay_ms)
    }

    /// Validate the simulator settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid("SIM_TICK_INTERVAL_MS", "must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.payment_success_rate) {
            return Err(ConfigError::invalid(
                "SIM_PAYMENT_SUCCESS_RATE",
                format!("{} is outside [0, 1]", self.payment_success_rate),
            ));
        }
        if self.stock_delta_min > self.stock_delta_max {
            return Err(ConfigError::invalid(
                "SIM_STOCK_DELTA_MIN",
                format!(
                    "{} is greater than SIM_STOCK_DELTA_MAX ({})",
                    self.stock_delta_min, self.stock_delta_max
                ),
            ));
        }
        Ok(())
    }
}

/// How the subscriber prints received events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-readable blocks
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl OutputFormat {
    /// Parse from a string, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Seconds between subscription status reports.
    pub status_interval_secs: u64,

    /// Output format for received events.
    pub output: OutputFormat,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: 30,
            output: OutputFormat::Text,
        }
    }
}

impl SubscriberConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SUBSCRIBER_STATUS_INTERVAL_SECS` (default: 30)
    /// - `SUBSCRIBER_OUTPUT`: `text` or `json` (default: text)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            status_interval_secs: env_parse("SUBSCRIBER_STATUS_INTERVAL_SECS")
                .unwrap_or(default.status_interval_secs),
            output: std::env::var("SUBSCRIBER_OUTPUT")
                .ok()
                .and_then(|s| OutputFormat::parse(&s))
                .unwrap_or(default.output),
        }
    }

    /// Status report interval as a Duration.
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    /// Validate the subscriber settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "SUBSCRIBER_STATUS_INTERVAL_SECS",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
