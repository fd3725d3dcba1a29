//! Bridge Configuration Settings
//!
//! Configuration types for the bridge service, loaded from environment
//! variables. Every variable has a default, so a bare environment yields
//! a working local configuration.

use std::time::Duration;

/// MQTT broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Broker hostname.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// The single feed topic to subscribe to.
    pub topic: String,
    /// MQTT keepalive interval.
    pub keepalive: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic: "/esp32/lidar/distance".to_string(),
            keepalive: Duration::from_secs(30),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port for the HTTP API and WebSocket endpoint.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8000 }
    }
}

/// Broadcast and history settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Capacity of the reading history buffer.
    pub history_capacity: usize,
    /// Upper bound on one client delivery before it counts as failed.
    pub send_timeout: Duration,
    /// Capacity of each client's outbound frame channel.
    pub client_channel_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            send_timeout: Duration::from_secs(2),
            client_channel_capacity: 64,
        }
    }
}

/// Reconnection settings for the broker connection.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub delay_initial: Duration,
    /// Maximum reconnection delay.
    pub delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_millis(500),
            delay_max: Duration::from_secs(30),
            delay_multiplier: 2.0,
            max_attempts: 0, // Unlimited
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// MQTT broker settings.
    pub broker: BrokerSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Broadcast and history settings.
    pub broadcast: BroadcastSettings,
    /// Broker reconnection settings.
    pub reconnect: ReconnectSettings,
}

impl BridgeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable that must be non-empty is set to
    /// an empty string.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = non_empty_env("MQTT_BROKER_HOST", &BrokerSettings::default().host)?;
        let topic = non_empty_env("MQTT_TOPIC", &BrokerSettings::default().topic)?;

        let broker = BrokerSettings {
            host,
            port: parse_env_u16("MQTT_BROKER_PORT", BrokerSettings::default().port),
            topic,
            keepalive: parse_env_duration_secs(
                "LIDAR_BRIDGE_MQTT_KEEPALIVE_SECS",
                BrokerSettings::default().keepalive,
            ),
        };

        let server = ServerSettings {
            http_port: parse_env_u16("APP_PORT", ServerSettings::default().http_port),
        };

        let broadcast = BroadcastSettings {
            history_capacity: parse_env_usize(
                "LIDAR_BRIDGE_HISTORY_CAPACITY",
                BroadcastSettings::default().history_capacity,
            ),
            send_timeout: parse_env_duration_millis(
                "LIDAR_BRIDGE_SEND_TIMEOUT_MS",
                BroadcastSettings::default().send_timeout,
            ),
            client_channel_capacity: parse_env_usize(
                "LIDAR_BRIDGE_CLIENT_CHANNEL_CAPACITY",
                BroadcastSettings::default().client_channel_capacity,
            ),
        };

        let reconnect = ReconnectSettings {
            delay_initial: parse_env_duration_millis(
                "LIDAR_BRIDGE_RECONNECT_DELAY_INITIAL_MS",
                ReconnectSettings::default().delay_initial,
            ),
            delay_max: parse_env_duration_secs(
                "LIDAR_BRIDGE_RECONNECT_DELAY_MAX_SECS",
                ReconnectSettings::default().delay_max,
            ),
            delay_multiplier: parse_env_f64(
                "LIDAR_BRIDGE_RECONNECT_DELAY_MULTIPLIER",
                ReconnectSettings::default().delay_multiplier,
            ),
            max_attempts: parse_env_u32(
                "LIDAR_BRIDGE_MAX_RECONNECT_ATTEMPTS",
                ReconnectSettings::default().max_attempts,
            ),
        };

        Ok(Self {
            broker,
            server,
            broadcast,
            reconnect,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has an empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn non_empty_env(key: &str, default: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Ok(value) => Ok(value),
        Err(_) => Ok(default.to_string()),
    }
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
