//! # Channel Transport
//!
//! The connection manager talks to the tracking endpoint through a
//! [`Connector`], which opens one bidirectional [`Channel`] per attempt.
//!
//! - [`WebSocketConnector`] opens a real WebSocket using `tokio-tungstenite`
//!   and pumps frames between the socket and the channel on its own task.
//! - [`InProcessConnector`] hands every open request to the caller, which
//!   decides whether to accept it and then plays the server side. Useful for
//!   simulations and tests.
//!
//! A handshake refused with HTTP 401/403 is reported as
//! [`TrackingError::AuthRejected`], the same as a post-open 1008 close.

use super::state::{CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_NO_STATUS};
use crate::shared::TrackingError;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Frame written by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close { code: u16, reason: String },
}

/// Event observed on an open channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Text(String),
    Closed { code: u16, reason: String },
    Error(String),
}

/// Client half of an open channel
#[derive(Debug)]
pub struct Channel {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Server-facing half of an open channel
#[derive(Debug)]
pub struct RemoteEnd {
    /// Frames written by the client
    pub frames: mpsc::UnboundedReceiver<OutboundFrame>,
    /// Events delivered to the client
    pub events: mpsc::UnboundedSender<ChannelEvent>,
}

impl Channel {
    /// Create a connected client/remote pair
    pub fn pair() -> (Channel, RemoteEnd) {
        let (outbound, frames) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();
        (Channel { outbound, inbound }, RemoteEnd { frames, events })
    }

    /// Queue a text frame. Returns false if the channel is gone.
    pub fn send_text(&self, text: String) -> bool {
        self.outbound.send(OutboundFrame::Text(text)).is_ok()
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.outbound.send(OutboundFrame::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next inbound event. A vanished remote reads as an abnormal close.
    pub async fn recv(&mut self) -> ChannelEvent {
        self.inbound.recv().await.unwrap_or(ChannelEvent::Closed {
            code: CLOSE_ABNORMAL,
            reason: "channel dropped".to_string(),
        })
    }
}

impl RemoteEnd {
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.events.send(ChannelEvent::Text(text.into())).is_ok()
    }

    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.events
            .send(ChannelEvent::Closed {
                code,
                reason: reason.into(),
            })
            .is_ok()
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.events.send(ChannelEvent::Error(message.into())).is_ok()
    }

    /// Next frame written by the client, `None` once the client dropped the channel
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        self.frames.recv().await
    }
}

/// Opens channels to the tracking endpoint
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: String) -> BoxFuture<'static, Result<Channel, TrackingError>>;
}

/// Real WebSocket connector
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn open(&self, url: String) -> BoxFuture<'static, Result<Channel, TrackingError>> {
        async move {
            let (socket, _response) = connect_async(url.as_str())
                .await
                .map_err(handshake_error)?;
            let (channel, remote) = Channel::pair();
            tokio::spawn(pump(socket, remote));
            Ok(channel)
        }
        .boxed()
    }
}

fn handshake_error(error: WsError) -> TrackingError {
    match error {
        WsError::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
            TrackingError::auth_rejected(format!("handshake refused: {}", response.status()))
        }
        other => TrackingError::transport(other.to_string()),
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn pump(socket: Socket, remote: RemoteEnd) {
    let RemoteEnd { mut frames, events } = remote;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(OutboundFrame::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        let _ = events.send(ChannelEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(OutboundFrame::Close { code, reason }) => {
                    let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
                None => {
                    let frame = CloseFrame { code: CloseCode::from(CLOSE_NORMAL), reason: "".into() };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(ChannelEvent::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    let _ = events.send(ChannelEvent::Closed { code, reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(ChannelEvent::Error(e.to_string()));
                    break;
                }
                None => {
                    let _ = events.send(ChannelEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "connection dropped".to_string(),
                    });
                    break;
                }
            },
        }
    }

    let _ = sink.close().await;
}

/// An open request waiting for the server side to answer
#[derive(Debug)]
pub struct PendingOpen {
    pub url: String,
    reply: oneshot::Sender<Result<Channel, TrackingError>>,
}

impl PendingOpen {
    /// Complete the handshake and return the server side of the channel
    pub fn accept(self) -> RemoteEnd {
        let (channel, remote) = Channel::pair();
        let _ = self.reply.send(Ok(channel));
        remote
    }

    /// Refuse the handshake as an authentication failure
    pub fn reject_auth(self, reason: &str) {
        let _ = self.reply.send(Err(TrackingError::auth_rejected(reason)));
    }

    /// Fail the handshake with a transport error
    pub fn fail(self, message: &str) {
        let _ = self.reply.send(Err(TrackingError::transport(message)));
    }
}

/// Connector whose server side is played in-process
#[derive(Debug, Clone)]
pub struct InProcessConnector {
    requests: mpsc::UnboundedSender<PendingOpen>,
}

impl InProcessConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingOpen>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (Self { requests }, rx)
    }
}

impl Connector for InProcessConnector {
    fn open(&self, url: String) -> BoxFuture<'static, Result<Channel, TrackingError>> {
        let requests = self.requests.clone();
        async move {
            let (reply, answer) = oneshot::channel();
            requests
                .send(PendingOpen { url, reply })
                .map_err(|_| TrackingError::transport("no server side listening"))?;
            answer
                .await
                .map_err(|_| TrackingError::transport("handshake aborted"))?
        }
        .boxed()
    }
}
