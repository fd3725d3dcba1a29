//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete adapters that connect the domain to
//! the outside world: the MQTT subscriber, the broadcast bridge, and the
//! HTTP/WebSocket surface.

/// MQTT subscriber adapter with reconnect policy.
pub mod mqtt;

/// Broadcast bridge: history, client registry, and fan-out.
pub mod bridge;

/// HTTP API and WebSocket streaming endpoint.
pub mod http;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
