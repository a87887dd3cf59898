//! End-to-end driver flows over a loopback WebSocket server

use crate::common::*;
use courier_track::driver_app::connection::ConnectionState;
use courier_track::driver_app::delivery::{DeliveryEvent, DeliveryStateMachine, DeliveryStatus};
use courier_track::driver_app::local_db::CURRENT_DELIVERY_KEY;
use courier_track::driver_app::location::{LineReader, SampledSource};
use courier_track::driver_app::{
    ConnectionManager, Credentials, LocalStore, LocationPublisher, NetworkMonitor, NetworkStatus,
    SampleOptions, WebSocketConnector,
};
use courier_track::shared::ConnectionEvent;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::time::timeout;

async fn wait_open(manager: &ConnectionManager) {
    let mut rx = manager.watch_state();
    timeout(WAIT, rx.wait_for(|s| s.is_open())).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_positions_stream_from_line_feed() {
    let mut server = TrackingServer::start(HandshakeMode::Accept).await;
    let store = LocalStore::in_memory().await.unwrap();
    let manager = ConnectionManager::spawn(
        WebSocketConnector,
        test_config(&server.url, "http://127.0.0.1:9"),
        store,
    );

    let (mut feed, input) = tokio::io::duplex(1024);
    let publisher = LocationPublisher::spawn(
        SampledSource::new(LineReader::new(BufReader::new(input))),
        manager.handle(),
        SampleOptions::default(),
    );

    manager.connect(Credentials::new("d1", valid_token("d1")));
    let mut connection = server.next_connection().await;
    wait_open(&manager).await;
    let mut tracking = publisher.watch_tracking();
    timeout(WAIT, tracking.wait_for(|t| *t)).await.unwrap().unwrap();

    feed.write_all(b"6.9271,79.8612\nnot a fix\n6.9300,79.8700\n").await.unwrap();

    let first: serde_json::Value =
        serde_json::from_str(&connection.next_payload().await.unwrap()).unwrap();
    let second: serde_json::Value =
        serde_json::from_str(&connection.next_payload().await.unwrap()).unwrap();
    assert_eq!(first, serde_json::json!({ "latitude": 6.9271, "longitude": 79.8612 }));
    assert_eq!(second, serde_json::json!({ "latitude": 6.93, "longitude": 79.87 }));

    publisher.shutdown().await;
    manager.shutdown().await;
}

#[tokio::test]
async fn test_resume_after_restart() {
    let mut server = TrackingServer::start(HandshakeMode::Accept).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local.db");
    let config = test_config(&server.url, "http://127.0.0.1:9");

    // first run: login, connect, accept a delivery
    {
        let store = LocalStore::open(&path).await.unwrap();
        let token = valid_token("d7");
        store.save_token(&token).await.unwrap();
        let manager = ConnectionManager::spawn(WebSocketConnector, config.clone(), store.clone());
        manager.connect(Credentials::new("d7", token));
        let _connection = server.next_connection().await;
        wait_open(&manager).await;

        let mut deliveries = DeliveryStateMachine::new(StaticLookup::seeded(), store);
        assert!(deliveries.accept_delivery(&sample_order()).await);
        assert!(deliveries.update_delivery_status("OUTFORDELIVERY").await);
        manager.shutdown().await;
    }

    // second run: everything comes back from the store
    let store = LocalStore::open(&path).await.unwrap();
    let manager = ConnectionManager::spawn(WebSocketConnector, config, store.clone());
    manager.resume();
    let connection = server.next_connection().await;
    assert!(connection.uri.starts_with("/ws/drivers/d7?token="));
    wait_open(&manager).await;

    let mut deliveries = DeliveryStateMachine::new(StaticLookup::seeded(), store);
    let mut events = deliveries.subscribe();
    let delivery = deliveries.restore().await.unwrap();
    assert_eq!(delivery.status, DeliveryStatus::OutForDelivery);
    assert_eq!(delivery.history.len(), 2);
    assert!(matches!(events.recv().await.unwrap(), DeliveryEvent::Restored { .. }));
}

#[tokio::test]
async fn test_resume_with_expired_token_asks_for_login() {
    let mut server = TrackingServer::start(HandshakeMode::Accept).await;
    let store = LocalStore::in_memory().await.unwrap();
    store.save_token(&expired_token("d1")).await.unwrap();
    store.save_driver_id("d1").await.unwrap();

    let manager = ConnectionManager::spawn(
        WebSocketConnector,
        test_config(&server.url, "http://127.0.0.1:9"),
        store.clone(),
    );
    let mut events = manager.subscribe();
    manager.resume();

    assert!(matches!(
        timeout(WAIT, events.recv()).await.unwrap().unwrap(),
        ConnectionEvent::ReauthenticationRequired { .. }
    ));
    assert!(store.load_credentials().await.unwrap().is_none());
    assert!(server.connection_within(Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn test_network_regained_reconnects_after_exhaustion() {
    let mut server = TrackingServer::start(HandshakeMode::Accept).await;
    let store = LocalStore::in_memory().await.unwrap();
    let manager = ConnectionManager::spawn(
        WebSocketConnector,
        test_config(&server.url, "http://127.0.0.1:9"),
        store.clone(),
    );
    let mut monitor = NetworkMonitor::new(manager.handle());

    let token = valid_token("d1");
    store.save_token(&token).await.unwrap();
    manager.connect(Credentials::new("d1", token));
    let first = server.next_connection().await;
    wait_open(&manager).await;

    // server goes away for good: normal close leaves the manager disconnected
    first.close(1000);
    let mut state = manager.watch_state();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();

    monitor.report_network(NetworkStatus::Offline);
    monitor.report_network(NetworkStatus::Online);
    let second = server.next_connection().await;
    assert!(second.uri.starts_with("/ws/drivers/d1?token="));
    wait_open(&manager).await;
}

#[tokio::test]
async fn test_complete_delivery_erases_record() {
    let store = LocalStore::in_memory().await.unwrap();
    let mut deliveries = DeliveryStateMachine::new(StaticLookup::seeded(), store.clone());

    assert!(deliveries.accept_delivery(&sample_order()).await);
    assert!(!deliveries.update_delivery_status("COMPLETED").await);
    assert!(deliveries.update_delivery_status("OUTFORDELIVERY").await);
    assert_eq!(deliveries.current().unwrap().history.len(), 2);

    assert!(deliveries.complete_delivery().await);
    assert!(deliveries.current().is_none());
    assert_eq!(store.get(CURRENT_DELIVERY_KEY).await.unwrap(), None);
}
