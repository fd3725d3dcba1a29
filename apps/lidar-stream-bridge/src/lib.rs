#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Lidar Stream Bridge - MQTT to WebSocket Fan-Out
//!
//! A service that maintains a single subscription to an MQTT sensor feed
//! (an ESP32 lidar publishing distance readings) and multiplexes each
//! reading to multiple downstream WebSocket clients, keeping a bounded
//! in-memory history that is replayed to new clients and served over
//! plain HTTP JSON endpoints.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core reading and history types
//!   - `reading`: The timestamped sensor sample
//!   - `history`: Bounded FIFO buffer of recent readings
//!
//! - **Application**: Use cases
//!   - `services`: The ingest event loop driving the bridge
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `mqtt`: MQTT subscriber with reconnect policy
//!   - `bridge`: History + client registry + broadcast fan-out
//!   - `http`: axum server for query, health, metrics, and `/ws`
//!   - `config`: Environment-driven settings
//!   - `telemetry`: Tracing and OpenTelemetry integration
//!   - `metrics`: Prometheus instrumentation
//!
//! # Data Flow
//!
//! ```text
//!                        ┌─────────────────┐     ┌─────────────┐──► Client 1
//! MQTT broker ──────────►│ BroadcastBridge │────►│  WebSocket  │──► Client 2
//!  (one topic)           │ history+fan-out │     │  endpoint   │──► Client N
//!                        └─────────────────┘     └─────────────┘
//!                                 │
//!                                 └──► HTTP snapshots (/api/data/*)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core reading types with no external dependencies.
pub mod domain;

/// Application layer - Use cases wiring events into the bridge.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::history::HistoryBuffer;
pub use domain::reading::Reading;

// Application services
pub use application::services::run_event_loop;

// Infrastructure config
pub use infrastructure::config::{
    BridgeConfig, BrokerSettings, BroadcastSettings, ConfigError, ReconnectSettings,
    ServerSettings,
};

// Broadcast bridge (for integration tests)
pub use infrastructure::bridge::{
    BroadcastBridge, BroadcastConfig, ClientHandle, ClientId, ClientRegistry, DeliveryError,
    IngestError, SharedBridge,
};

// MQTT subscriber
pub use infrastructure::mqtt::{
    BrokerState, ConnectionState, MqttClientError, MqttEvent, MqttSubscriber,
    MqttSubscriberConfig,
};

// HTTP server (for integration tests)
pub use infrastructure::http::{ApiServer, ApiServerError, AppState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
