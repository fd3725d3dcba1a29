//! Lidar Stream Bridge Binary
//!
//! Starts the MQTT to WebSocket bridge service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin lidar-stream-bridge
//! ```
//!
//! # Environment Variables
//!
//! All variables are optional and default to a local setup.
//!
//! - `MQTT_BROKER_HOST`: MQTT broker hostname (default: localhost)
//! - `MQTT_BROKER_PORT`: MQTT broker port (default: 1883)
//! - `MQTT_TOPIC`: Feed topic (default: /esp32/lidar/distance)
//! - `APP_PORT`: HTTP/WebSocket port (default: 8000)
//! - `LIDAR_BRIDGE_HISTORY_CAPACITY`: Reading history size (default: 100)
//! - `LIDAR_BRIDGE_SEND_TIMEOUT_MS`: Per-client delivery deadline (default: 2000)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: lidar-stream-bridge)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use lidar_stream_bridge::infrastructure::bridge::{BroadcastBridge, BroadcastConfig};
use lidar_stream_bridge::infrastructure::http::{ApiServer, AppState};
use lidar_stream_bridge::infrastructure::mqtt::{
    BrokerState, MqttEvent, MqttSubscriber, MqttSubscriberConfig,
};
use lidar_stream_bridge::infrastructure::telemetry;
use lidar_stream_bridge::{BridgeConfig, init_metrics, run_event_loop};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Lidar Stream Bridge");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = BridgeConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Initialize the broadcast bridge and the shared broker state
    let bridge = Arc::new(BroadcastBridge::new(BroadcastConfig::from(
        config.broadcast.clone(),
    )));
    let broker_state = Arc::new(BrokerState::new());

    // Event channel from the MQTT subscriber into the ingest loop
    let (event_tx, event_rx) = mpsc::channel::<MqttEvent>(1024);

    // Create the MQTT subscriber
    let subscriber_config = MqttSubscriberConfig::from_settings(&config.broker, &config.reconnect);
    let subscriber = Arc::new(MqttSubscriber::new(
        subscriber_config,
        event_tx,
        shutdown_token.clone(),
    ));

    // Spawn the ingest event loop
    let ingest_bridge = Arc::clone(&bridge);
    let ingest_broker_state = Arc::clone(&broker_state);
    tokio::spawn(async move {
        run_event_loop(event_rx, ingest_bridge, ingest_broker_state).await;
    });

    // Spawn the MQTT subscriber; connection failure degrades the feed
    // rather than stopping the service
    tokio::spawn(async move {
        if let Err(e) = subscriber.run().await {
            tracing::error!(error = %e, "MQTT subscriber error");
        }
    });

    // Spawn the HTTP server (query endpoints, health, metrics, /ws)
    let app_state = Arc::new(AppState::new(
        Arc::clone(&bridge),
        Arc::clone(&broker_state),
        env!("CARGO_PKG_VERSION").to_string(),
        config.broadcast.client_channel_capacity,
        shutdown_token.clone(),
    ));
    let api_server = ApiServer::new(
        config.server.http_port,
        app_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = api_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Bridge ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Bridge stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &BridgeConfig) {
    tracing::info!(
        broker_host = %config.broker.host,
        broker_port = config.broker.port,
        topic = %config.broker.topic,
        http_port = config.server.http_port,
        history_capacity = config.broadcast.history_capacity,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
