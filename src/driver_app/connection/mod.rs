//! # Connection Manager
//!
//! Owns the single tracking channel of a driver session and everything that
//! hangs off it: the heartbeat timer, the reconnection timer and the
//! persistence of the driver id.
//!
//! ## Features
//!
//! - **Single channel**: at most one live channel at a time; a new connect
//!   closes the previous one first
//! - **Heartbeat**: `{"type":"ping"}` every 10 s while open, stopped on any
//!   transition away from open
//! - **Backoff**: transient closes are retried with exponential backoff and
//!   jitter, up to 10 attempts
//! - **Auth handling**: a 1008 close (or a refused handshake) erases the
//!   stored credentials and asks the host to re-authenticate
//! - **Host signals**: foreground / network-online triggers reconnect from
//!   persisted credentials unless already open or connecting
//!
//! ## Usage
//!
//! ```rust,no_run
//! use courier_track::driver_app::auth::Credentials;
//! use courier_track::driver_app::config::Config;
//! use courier_track::driver_app::connection::{ConnectionManager, WebSocketConnector};
//! use courier_track::driver_app::local_db::LocalStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LocalStore::in_memory().await?;
//! let manager = ConnectionManager::spawn(WebSocketConnector, Config::new(), store);
//! manager.connect(Credentials::new("driver-1", "eyJ..."));
//!
//! let mut state = manager.watch_state();
//! state.wait_for(|s| s.is_open()).await?;
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The manager runs as one tokio task. Callers hold a cloneable
//! [`ConnectionHandle`] that forwards commands over an unbounded channel, so
//! every mutation is applied in call order by the task. State is published
//! through a `watch` channel and lifecycle events through a `broadcast`
//! channel.

pub mod backoff;
pub mod state;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use state::{CloseDisposition, ConnectionState};
pub use transport::{
    Channel, ChannelEvent, Connector, InProcessConnector, OutboundFrame, PendingOpen, RemoteEnd,
    WebSocketConnector,
};

use crate::driver_app::auth::{self, Credentials};
use crate::driver_app::config::Config;
use crate::driver_app::local_db::LocalStore;
use crate::shared::{ConnectionEvent, HostSignal, OutboundMessage, TrackingError};
use futures_util::future::BoxFuture;
use state::CLOSE_NORMAL;
use std::ops::Deref;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug)]
enum Command {
    Connect(Credentials),
    Disconnect,
    Send(OutboundMessage),
    HostSignal(HostSignal),
    Resume,
    Shutdown,
}

/// Cloneable handle to a running connection manager
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionHandle {
    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Connection manager is gone; command dropped");
        }
    }

    /// Open the channel for `credentials`.
    ///
    /// No-op while a connection attempt is in flight. Resets the retry
    /// counter and cancels a pending retry.
    pub fn connect(&self, credentials: Credentials) {
        self.command(Command::Connect(credentials));
    }

    /// Close the channel with a normal close and cancel any retry
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Write a message if the channel is open; dropped otherwise
    pub fn send(&self, message: impl Into<OutboundMessage>) {
        self.command(Command::Send(message.into()));
    }

    /// Out-of-band reconnect trigger from the host
    pub fn host_signal(&self, signal: HostSignal) {
        self.command(Command::HostSignal(signal));
    }

    /// Start-up rule: reconnect from persisted credentials if the token is
    /// still valid, otherwise clear them and ask for re-authentication
    pub fn resume(&self) {
        self.command(Command::Resume);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }
}

/// Owner of the connection manager task
///
/// Dropping it aborts the task; [`ConnectionManager::shutdown`] closes the
/// channel gracefully first.
#[derive(Debug)]
pub struct ConnectionManager {
    handle: ConnectionHandle,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn spawn<C: Connector>(connector: C, config: Config, store: LocalStore) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let settings = config.tracking();
        let actor = Actor {
            policy: ReconnectPolicy::from_settings(settings),
            heartbeat_every: settings.heartbeat_interval(),
            connector,
            config,
            store,
            state_tx,
            events: events.clone(),
            credentials: None,
            rejected_token: None,
            retry_count: 0,
            connection_id: Uuid::nil(),
            channel: None,
            pending_open: None,
            retry_at: None,
            heartbeat: None,
        };
        let task = tokio::spawn(actor.run(command_rx));

        Self {
            handle: ConnectionHandle { commands, state, events },
            task: Some(task),
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Close the channel normally and wait for the task to finish
    pub async fn shutdown(mut self) {
        self.handle.command(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Deref for ConnectionManager {
    type Target = ConnectionHandle;

    fn deref(&self) -> &ConnectionHandle {
        &self.handle
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Actor<C> {
    connector: C,
    config: Config,
    store: LocalStore,
    policy: ReconnectPolicy,
    heartbeat_every: Duration,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    credentials: Option<Credentials>,
    /// Token refused by the server; not retried until replaced
    rejected_token: Option<String>,
    retry_count: u32,
    /// Identifies the current attempt in logs
    connection_id: Uuid,
    channel: Option<Channel>,
    pending_open: Option<BoxFuture<'static, Result<Channel, TrackingError>>>,
    retry_at: Option<Instant>,
    heartbeat: Option<Interval>,
}

impl<C: Connector> Actor<C> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                result = next_open(&mut self.pending_open) => {
                    self.pending_open = None;
                    self.on_open_result(result).await;
                }
                event = next_event(&mut self.channel) => self.on_channel_event(event).await,
                _ = retry_due(self.retry_at) => {
                    self.retry_at = None;
                    self.open_channel();
                }
                _ = next_tick(&mut self.heartbeat) => self.write(OutboundMessage::ping()),
            }
        }

        self.retry_at = None;
        self.pending_open = None;
        self.close_channel();
        self.set_state(ConnectionState::Disconnected);
        info!("Connection manager stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(credentials) => self.connect(credentials),
            Command::Disconnect => self.disconnect(),
            Command::Send(message) => self.write(message),
            Command::HostSignal(signal) => self.on_host_signal(signal).await,
            Command::Resume => self.resume().await,
            Command::Shutdown => {}
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&mut self, next: ConnectionState) {
        if next != ConnectionState::Open {
            self.heartbeat = None;
        }
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            debug!(connection_id = %self.connection_id, "Connection state {} -> {}", previous, next);
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    fn connect(&mut self, credentials: Credentials) {
        let state = self.state();
        if state == ConnectionState::Connecting {
            debug!("Already connecting, skipping.");
            return;
        }
        if state == ConnectionState::AuthFailed
            && self.rejected_token.as_deref() == Some(credentials.token.as_str())
        {
            warn!("Ignoring connect with rejected credentials for driver {}", credentials.driver_id);
            return;
        }

        self.retry_count = 0;
        self.retry_at = None;
        self.rejected_token = None;
        self.credentials = Some(credentials);
        self.open_channel();
    }

    fn open_channel(&mut self) {
        self.close_channel();

        let Some(credentials) = self.credentials.as_ref() else {
            warn!("No credentials to connect with");
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        self.connection_id = Uuid::new_v4();
        let url = self.config.channel_url(&credentials.driver_id, &credentials.token);
        info!(
            connection_id = %self.connection_id,
            "Opening tracking channel for driver {} (attempt {})",
            credentials.driver_id,
            self.retry_count + 1
        );
        self.set_state(ConnectionState::Connecting);
        self.pending_open = Some(self.connector.open(url));
    }

    fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close(CLOSE_NORMAL, "client disconnect");
        }
    }

    fn disconnect(&mut self) {
        self.retry_at = None;
        self.pending_open = None;
        self.close_channel();
        if self.state() != ConnectionState::AuthFailed {
            self.set_state(ConnectionState::Disconnected);
        }
        info!(connection_id = %self.connection_id, "Tracking channel disconnected");
    }

    fn write(&mut self, message: OutboundMessage) {
        let Some(channel) = self.channel.as_ref().filter(|_| self.state().is_open()) else {
            debug!("Channel not open; dropping {:?}", message);
            return;
        };
        match message.to_frame() {
            Ok(frame) => {
                if !channel.send_text(frame) {
                    warn!(connection_id = %self.connection_id, "Channel writer is gone");
                }
            }
            Err(e) => error!("Failed to encode outbound message: {}", e),
        }
    }

    async fn on_open_result(&mut self, result: Result<Channel, TrackingError>) {
        match result {
            Ok(channel) => {
                let driver_id = self
                    .credentials
                    .as_ref()
                    .map(|c| c.driver_id.clone())
                    .unwrap_or_default();

                self.channel = Some(channel);
                self.retry_count = 0;
                self.set_state(ConnectionState::Open);

                let mut heartbeat =
                    tokio::time::interval_at(Instant::now() + self.heartbeat_every, self.heartbeat_every);
                heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.heartbeat = Some(heartbeat);

                info!(connection_id = %self.connection_id, "Connected to tracking channel as {}", driver_id);
                if let Err(e) = self.store.save_driver_id(&driver_id).await {
                    warn!("Failed to persist driver id: {}", e);
                }
                self.emit(ConnectionEvent::Opened { driver_id });
            }
            Err(TrackingError::AuthRejected { reason }) => self.on_auth_failure(reason).await,
            Err(e) => {
                error!(connection_id = %self.connection_id, "Failed to open tracking channel: {}", e);
                self.schedule_retry();
            }
        }
    }

    async fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Text(text) => {
                debug!(connection_id = %self.connection_id, "Message from server: {}", text);
            }
            ChannelEvent::Closed { code, reason } => {
                self.channel = None;
                info!(connection_id = %self.connection_id, "Tracking channel closed: {} {}", code, reason);
                self.emit(ConnectionEvent::Closed { code, reason: reason.clone() });

                match CloseDisposition::from_code(code) {
                    CloseDisposition::Normal => self.set_state(ConnectionState::Disconnected),
                    CloseDisposition::AuthRejected => self.on_auth_failure(reason).await,
                    CloseDisposition::Transient => self.schedule_retry(),
                }
            }
            ChannelEvent::Error(message) => {
                self.channel = None;
                error!(connection_id = %self.connection_id, "Tracking channel error: {}", message);
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        if !self.policy.allows(self.retry_count) {
            error!("Max retries reached, giving up.");
            self.set_state(ConnectionState::Disconnected);
            self.emit(ConnectionEvent::ReconnectExhausted { attempts: self.retry_count });
            return;
        }

        let delay = self.policy.delay(self.retry_count);
        self.retry_count += 1;
        self.retry_at = Some(Instant::now() + delay);
        self.set_state(ConnectionState::Reconnecting);
        info!("Reconnecting in {:?} (attempt {})", delay, self.retry_count);
        self.emit(ConnectionEvent::ReconnectScheduled {
            attempt: self.retry_count,
            delay,
        });
    }

    async fn on_auth_failure(&mut self, reason: String) {
        warn!(connection_id = %self.connection_id, "Tracking credentials rejected: {}", reason);
        self.retry_at = None;
        self.pending_open = None;
        self.close_channel();
        self.rejected_token = self.credentials.take().map(|c| c.token);
        self.set_state(ConnectionState::AuthFailed);

        if let Err(e) = self.store.clear_credentials().await {
            warn!("Failed to clear stored credentials: {}", e);
        }
        self.emit(ConnectionEvent::ReauthenticationRequired { reason });
    }

    async fn on_host_signal(&mut self, signal: HostSignal) {
        if self.state().is_live() {
            debug!("Ignoring {:?}; channel is {}", signal, self.state());
            return;
        }
        match self.store.load_credentials().await {
            Ok(Some(credentials)) => {
                info!("Reconnecting after {:?}", signal);
                self.connect(credentials);
            }
            Ok(None) => debug!("No stored credentials; ignoring {:?}", signal),
            Err(e) => warn!("Failed to read stored credentials: {}", e),
        }
    }

    async fn resume(&mut self) {
        let credentials = match self.store.load_credentials().await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                debug!("No stored credentials to resume with");
                return;
            }
            Err(e) => {
                warn!("Failed to read stored credentials: {}", e);
                return;
            }
        };

        if auth::is_token_valid(&credentials.token) {
            self.connect(credentials);
        } else {
            warn!("Stored token expired; clearing credentials");
            if let Err(e) = self.store.clear_credentials().await {
                warn!("Failed to clear stored credentials: {}", e);
            }
            self.emit(ConnectionEvent::ReauthenticationRequired {
                reason: "token expired".to_string(),
            });
        }
    }
}

async fn next_open(
    pending: &mut Option<BoxFuture<'static, Result<Channel, TrackingError>>>,
) -> Result<Channel, TrackingError> {
    match pending {
        Some(open) => open.await,
        None => std::future::pending().await,
    }
}

async fn next_event(channel: &mut Option<Channel>) -> ChannelEvent {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

async fn retry_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
