//! Loopback tracking server for integration tests
//!
//! Accepts WebSocket upgrades on `127.0.0.1`, records the request path and
//! token of every connection and hands each accepted connection to the test,
//! which can read the client's frames and close with any code.

use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::fixtures::WAIT;

const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// How the server answers upgrade requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMode {
    Accept,
    /// Refuse the upgrade with this HTTP status
    Refuse(u16),
}

/// One accepted client connection
pub struct ServerConnection {
    /// Request path and query, e.g. `/ws/drivers/d1?token=...`
    pub uri: String,
    frames: mpsc::UnboundedReceiver<String>,
    control: mpsc::UnboundedSender<u16>,
}

impl ServerConnection {
    pub fn token(&self) -> Option<&str> {
        self.uri.split_once("token=").map(|(_, token)| token)
    }

    /// Close the connection from the server side
    pub fn close(&self, code: u16) {
        let _ = self.control.send(code);
    }

    /// Next text frame, `None` once the client went away
    pub async fn next_text(&mut self) -> Option<String> {
        timeout(WAIT, self.frames.recv()).await.expect("Timed out waiting for a frame")
    }

    /// Next text frame that is not a heartbeat
    pub async fn next_payload(&mut self) -> Option<String> {
        loop {
            match self.next_text().await {
                Some(frame) if frame == PING_FRAME => continue,
                other => return other,
            }
        }
    }
}

pub struct TrackingServer {
    /// Base URL to configure as the tracking endpoint
    pub url: String,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
    refused: Arc<Mutex<u32>>,
    task: JoinHandle<()>,
}

impl TrackingServer {
    pub async fn start(mode: HandshakeMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test server");
        let addr = listener.local_addr().expect("No local address");
        let (tx, connections) = mpsc::unbounded_channel();
        let refused = Arc::new(Mutex::new(0));

        let refused_count = Arc::clone(&refused);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                let refused = Arc::clone(&refused_count);
                tokio::spawn(handle_connection(stream, mode, tx, refused));
            }
        });

        Self {
            url: format!("ws://{}", addr),
            connections,
            refused,
            task,
        }
    }

    /// Wait for the next accepted connection
    pub async fn next_connection(&mut self) -> ServerConnection {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("Timed out waiting for a connection")
            .expect("Server stopped")
    }

    /// Whether a connection arrives within `window`
    pub async fn connection_within(&mut self, window: std::time::Duration) -> Option<ServerConnection> {
        timeout(window, self.connections.recv()).await.ok().flatten()
    }

    pub fn refused_handshakes(&self) -> u32 {
        *self.refused.lock().unwrap()
    }
}

impl Drop for TrackingServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    mode: HandshakeMode,
    connections: mpsc::UnboundedSender<ServerConnection>,
    refused: Arc<Mutex<u32>>,
) {
    let uri = Arc::new(Mutex::new(String::new()));
    let seen_uri = Arc::clone(&uri);

    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        *seen_uri.lock().unwrap() = request.uri().to_string();
        match mode {
            HandshakeMode::Accept => Ok(response),
            HandshakeMode::Refuse(status) => {
                *refused.lock().unwrap() += 1;
                let mut error = ErrorResponse::new(Some("unauthorized".to_string()));
                *error.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::UNAUTHORIZED);
                Err(error)
            }
        }
    };

    let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!("Handshake not completed: {}", e);
            return;
        }
    };
    let (mut sink, mut stream) = ws.split();

    let (frames_tx, frames) = mpsc::unbounded_channel();
    let (control, mut control_rx) = mpsc::unbounded_channel();
    let uri = uri.lock().unwrap().clone();
    if connections.send(ServerConnection { uri, frames, control }).is_err() {
        return;
    }

    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = frames_tx.send(text.as_str().to_owned());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            Some(code) = control_rx.recv() => {
                let frame = CloseFrame { code: CloseCode::from(code), reason: "closed by test".into() };
                let _ = sink.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }
}
