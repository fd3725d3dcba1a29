//! WebSocket Streaming Integration Tests
//!
//! Tests the full flow from payload ingest to WebSocket client
//! reception: history replay on connect, live fan-out, and pruning of
//! disconnected clients.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lidar_stream_bridge::infrastructure::http::{AppState, router};
use lidar_stream_bridge::{BroadcastBridge, BroadcastConfig, BrokerState};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a test server on a random port and return its address plus the
/// shared bridge for injecting readings.
async fn setup_test_server() -> (std::net::SocketAddr, Arc<BroadcastBridge>, CancellationToken) {
    let bridge = Arc::new(BroadcastBridge::new(BroadcastConfig {
        history_capacity: 100,
        send_timeout: Duration::from_millis(200),
    }));
    let cancel = CancellationToken::new();

    let state = Arc::new(AppState::new(
        Arc::clone(&bridge),
        Arc::new(BrokerState::new()),
        "test-0.0.1".to_string(),
        16,
        cancel.clone(),
    ));
    let app = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, bridge, cancel)
}

async fn connect(addr: std::net::SocketAddr) -> WsStream {
    let (ws, _response) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("WebSocket connect failed");
    ws
}

/// Receive the next text frame as parsed JSON.
async fn next_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("stream error");

        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn new_client_receives_history_frame_first() {
    let (addr, _bridge, _cancel) = setup_test_server().await;
    let mut ws = connect(addr).await;

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "history");
    assert_eq!(frame["data"], serde_json::json!([]));
}

#[tokio::test]
async fn history_replay_has_connect_time_contents_before_live_frames() {
    let (addr, bridge, _cancel) = setup_test_server().await;

    for payload in [b"1.0".as_slice(), b"2.0", b"3.0"] {
        bridge.ingest("/esp32/lidar/distance", payload).await.unwrap();
    }

    let mut ws = connect(addr).await;

    let replay = next_json(&mut ws).await;
    assert_eq!(replay["type"], "history");
    let data = replay["data"].as_array().unwrap();
    assert_eq!(data.len(), 3);
    assert_eq!(data[0]["value"], 1.0);
    assert_eq!(data[2]["value"], 3.0);

    // a reading ingested after connect arrives as a bare object
    bridge.ingest("/esp32/lidar/distance", b"4.0").await.unwrap();
    let live = next_json(&mut ws).await;
    assert!(live.get("type").is_none());
    assert_eq!(live["value"], 4.0);
    assert_eq!(live["topic"], "/esp32/lidar/distance");
}

#[tokio::test]
async fn live_fan_out_reaches_every_client() {
    let (addr, bridge, _cancel) = setup_test_server().await;

    let mut ws1 = connect(addr).await;
    let mut ws2 = connect(addr).await;
    let _ = next_json(&mut ws1).await;
    let _ = next_json(&mut ws2).await;

    bridge.ingest("t", b"42.5").await.unwrap();

    let r1 = next_json(&mut ws1).await;
    let r2 = next_json(&mut ws2).await;
    assert_eq!(r1["value"], 42.5);
    assert_eq!(r2["value"], 42.5);
}

#[tokio::test]
async fn readings_arrive_in_ingest_order() {
    let (addr, bridge, _cancel) = setup_test_server().await;

    let mut ws = connect(addr).await;
    let _ = next_json(&mut ws).await;

    for i in 0..10 {
        bridge.ingest("t", format!("{i}").as_bytes()).await.unwrap();
    }

    for i in 0..10 {
        let frame = next_json(&mut ws).await;
        assert_eq!(frame["value"], f64::from(i));
    }
}

#[tokio::test]
async fn closed_client_is_unregistered() {
    let (addr, bridge, _cancel) = setup_test_server().await;

    let mut ws = connect(addr).await;
    let _ = next_json(&mut ws).await;
    assert_eq!(bridge.client_count(), 1);

    ws.close(None).await.unwrap();

    // the connection task notices the close and unregisters
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while bridge.client_count() != 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "client was not pruned after close"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // later ingests still succeed with nobody listening
    bridge.ingest("t", b"1.0").await.unwrap();
    assert_eq!(bridge.history().len(), 1);
}

#[tokio::test]
async fn client_payloads_are_ignored() {
    let (addr, bridge, _cancel) = setup_test_server().await;

    let mut ws = connect(addr).await;
    let _ = next_json(&mut ws).await;

    ws.send(Message::Text("hello from the browser".into()))
        .await
        .unwrap();

    bridge.ingest("t", b"5.5").await.unwrap();
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["value"], 5.5);
    assert_eq!(bridge.client_count(), 1);
}

#[tokio::test]
async fn shutdown_closes_streaming_clients() {
    let (addr, bridge, cancel) = setup_test_server().await;

    let mut ws = connect(addr).await;
    let _ = next_json(&mut ws).await;

    cancel.cancel();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while bridge.client_count() != 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "client was not released on shutdown"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
