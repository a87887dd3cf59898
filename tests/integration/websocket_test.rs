//! Connection manager against a loopback WebSocket server

use crate::common::*;
use courier_track::driver_app::connection::ConnectionState;
use courier_track::driver_app::local_db::{DRIVER_ID_KEY, TOKEN_KEY};
use courier_track::driver_app::{ConnectionManager, Credentials, LocalStore, WebSocketConnector};
use courier_track::shared::{ConnectionEvent, LocationMessage};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::time::timeout;

async fn wait_for_state(manager: &ConnectionManager, wanted: ConnectionState) {
    let mut rx = manager.watch_state();
    timeout(WAIT, rx.wait_for(|s| *s == wanted))
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for {}", wanted))
        .unwrap();
}

async fn spawn_manager(server: &TrackingServer) -> (ConnectionManager, LocalStore) {
    let store = LocalStore::in_memory().await.unwrap();
    let config = test_config(&server.url, "http://127.0.0.1:9");
    (ConnectionManager::spawn(WebSocketConnector, config, store.clone()), store)
}

#[tokio::test]
async fn test_handshake_carries_driver_and_token() {
    let mut server = TrackingServer::start(HandshakeMode::Accept).await;
    let (manager, store) = spawn_manager(&server).await;
    let token = valid_token("driver-42");

    manager.connect(Credentials::from_token(token.clone()).unwrap());
    let connection = server.next_connection().await;
    assert!(connection.uri.starts_with("/ws/drivers/driver-42?token="));
    assert_eq!(connection.token(), Some(token.as_str()));

    wait_for_state(&manager, ConnectionState::Open).await;
    assert_eq!(store.get(DRIVER_ID_KEY).await.unwrap().as_deref(), Some("driver-42"));
}

#[tokio::test]
async fn test_heartbeat_and_location_frames() {
    let mut server = TrackingServer::start(HandshakeMode::Accept).await;
    let (manager, _store) = spawn_manager(&server).await;

    manager.connect(Credentials::new("d1", valid_token("d1")));
    let mut connection = server.next_connection().await;
    wait_for_state(&manager, ConnectionState::Open).await;

    assert_eq!(connection.next_text().await.as_deref(), Some(r#"{"type":"ping"}"#));

    manager.send(LocationMessage { latitude: 6.9271, longitude: 79.8612 });
    let payload = connection.next_payload().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(value, serde_json::json!({ "latitude": 6.9271, "longitude": 79.8612 }));
}

#[tokio::test]
async fn test_policy_violation_close_requires_reauthentication() {
    let mut server = TrackingServer::start(HandshakeMode::Accept).await;
    let (manager, store) = spawn_manager(&server).await;
    let token = valid_token("d1");
    store.save_token(&token).await.unwrap();
    let mut events = manager.subscribe();

    manager.connect(Credentials::new("d1", token));
    let connection = server.next_connection().await;
    wait_for_state(&manager, ConnectionState::Open).await;

    connection.close(1008);
    wait_for_state(&manager, ConnectionState::AuthFailed).await;

    let mut closed_code = None;
    let mut reauth = false;
    while let Ok(Ok(event)) = timeout(Duration::from_millis(500), events.recv()).await {
        match event {
            ConnectionEvent::Closed { code, .. } => closed_code = Some(code),
            ConnectionEvent::ReauthenticationRequired { .. } => {
                reauth = true;
                break;
            }
            _ => {}
        }
    }
    assert_eq!(closed_code, Some(1008));
    assert!(reauth);
    assert_eq!(store.get(TOKEN_KEY).await.unwrap(), None);
    assert_eq!(store.get(DRIVER_ID_KEY).await.unwrap(), None);

    // never retried automatically
    assert!(server.connection_within(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn test_refused_handshake_is_auth_failure() {
    let mut server = TrackingServer::start(HandshakeMode::Refuse(401)).await;
    let (manager, _store) = spawn_manager(&server).await;

    manager.connect(Credentials::new("d1", "revoked-token"));
    wait_for_state(&manager, ConnectionState::AuthFailed).await;
    assert_eq!(server.refused_handshakes(), 1);
    assert!(server.connection_within(Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn test_server_error_close_reconnects() {
    let mut server = TrackingServer::start(HandshakeMode::Accept).await;
    let (manager, _store) = spawn_manager(&server).await;

    manager.connect(Credentials::new("d1", "tok"));
    let first = server.next_connection().await;
    wait_for_state(&manager, ConnectionState::Open).await;

    first.close(1011);
    let second = server.next_connection().await;
    assert_eq!(second.uri, "/ws/drivers/d1?token=tok");
    wait_for_state(&manager, ConnectionState::Open).await;
}

#[tokio::test]
async fn test_unreachable_endpoint_exhausts_retries() {
    // Nothing listens on port 9 of the loopback interface.
    let store = LocalStore::in_memory().await.unwrap();
    let manager = ConnectionManager::spawn(
        WebSocketConnector,
        test_config("ws://127.0.0.1:9", "http://127.0.0.1:9"),
        store,
    );
    let mut events = manager.subscribe();

    manager.connect(Credentials::new("d1", "tok"));
    let mut scheduled = Vec::new();
    let exhausted = loop {
        match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
            ConnectionEvent::ReconnectScheduled { attempt, .. } => scheduled.push(attempt),
            ConnectionEvent::ReconnectExhausted { attempts } => break attempts,
            _ => {}
        }
    };
    assert_eq!(scheduled, vec![1, 2, 3]);
    assert_eq!(exhausted, 3);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_closes_normally() {
    let mut server = TrackingServer::start(HandshakeMode::Accept).await;
    let (manager, _store) = spawn_manager(&server).await;

    manager.connect(Credentials::new("d1", "tok"));
    let mut connection = server.next_connection().await;
    wait_for_state(&manager, ConnectionState::Open).await;

    manager.disconnect();
    wait_for_state(&manager, ConnectionState::Disconnected).await;
    // server sees the close; frames after it are never written
    assert_eq!(connection.next_payload().await, None);
    assert!(server.connection_within(Duration::from_millis(200)).await.is_none());
}
