//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Readings**: Counts of readings received, rejected, and fanned out
//! - **Clients**: Connected WebSocket clients and drop counts
//! - **Broker**: Reconnection attempts
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "lidar_bridge_readings_received_total",
        "Total readings received from the MQTT feed"
    );
    describe_counter!(
        "lidar_bridge_readings_rejected_total",
        "Total payloads dropped because they did not decode"
    );
    describe_counter!(
        "lidar_bridge_frames_sent_total",
        "Total frames delivered to WebSocket clients"
    );
    describe_counter!(
        "lidar_bridge_clients_dropped_total",
        "Total clients removed after a delivery failure"
    );
    describe_counter!(
        "lidar_bridge_mqtt_reconnects_total",
        "Total MQTT reconnection attempts"
    );

    describe_gauge!(
        "lidar_bridge_ws_clients",
        "Number of connected WebSocket clients"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a reading received from the MQTT feed.
pub fn record_reading_received() {
    counter!("lidar_bridge_readings_received_total").increment(1);
}

/// Record a payload rejected by the decoder.
pub fn record_reading_rejected() {
    counter!("lidar_bridge_readings_rejected_total").increment(1);
}

/// Record frames delivered to WebSocket clients.
pub fn record_frames_sent(count: u64) {
    counter!("lidar_bridge_frames_sent_total").increment(count);
}

/// Record a client dropped after a delivery failure.
pub fn record_client_dropped() {
    counter!("lidar_bridge_clients_dropped_total").increment(1);
}

/// Record an MQTT reconnection attempt.
pub fn record_reconnect() {
    counter!("lidar_bridge_mqtt_reconnects_total").increment(1);
}

/// Update the connected WebSocket client count.
#[allow(clippy::cast_precision_loss)]
pub fn set_connected_clients(count: usize) {
    gauge!("lidar_bridge_ws_clients").set(count as f64);
}
