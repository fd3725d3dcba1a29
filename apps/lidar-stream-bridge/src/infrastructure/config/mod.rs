//! Configuration Module
//!
//! Configuration loading for the bridge service.

mod settings;

pub use settings::{
    BridgeConfig, BroadcastSettings, BrokerSettings, ConfigError, ReconnectSettings,
    ServerSettings,
};
