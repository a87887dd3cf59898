//! # Remote Position Poller
//!
//! Pulls the bulk snapshot of every connected driver's last position on a
//! fixed cadence (immediately, then every second by default) so map views
//! can locate a driver without a channel of their own.
//!
//! ## Features
//!
//! - **Fixed schedule**: a failed poll is logged and surfaced as a soft error;
//!   the next tick runs regardless. A poll still unanswered when the next
//!   tick is due is abandoned and counts as failed
//! - **Wholesale refresh**: each poll replaces the whole snapshot
//! - **Stale-but-displayed**: if the followed driver is missing from a
//!   snapshot, the previously known position is kept
//!
//! ## Usage
//!
//! ```rust,no_run
//! use courier_track::driver_app::config::Config;
//! use courier_track::driver_app::poller::{HttpSnapshotSource, RemotePositionPoller};
//!
//! # async fn example() {
//! let config = Config::new();
//! let poller = RemotePositionPoller::spawn(
//!     HttpSnapshotSource::new(&config),
//!     Some("driver-1".to_string()),
//!     config.tracking().poll_interval(),
//! );
//! let mut state = poller.watch();
//! state.changed().await.ok();
//! println!("driver at {:?}", poller.driver_position());
//! # }
//! ```

use crate::driver_app::config::Config;
use crate::shared::{GeoPoint, RemotePositionSnapshot, TrackingError, TrackingSettings};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Bulk read of all connected drivers' positions
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<RemotePositionSnapshot, TrackingError>> + Send;
}

/// [`SnapshotSource`] over HTTP
///
/// Each request is bounded by the poll interval.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpSnapshotSource {
    pub fn new(config: &Config) -> Self {
        Self::with_url(config.snapshot_url()).timeout(config.tracking().poll_interval())
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout: TrackingSettings::default().poll_interval(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn fetch(&self) -> impl Future<Output = Result<RemotePositionSnapshot, TrackingError>> + Send {
        async move {
            let response = self
                .client
                .get(&self.url)
                .timeout(self.timeout)
                .send()
                .await?
                .error_for_status()?;
            let body = response.text().await?;
            Ok(serde_json::from_str(&body)?)
        }
    }
}

/// Last known position of one driver
///
/// Absence from a snapshot leaves the known position in place.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverPositionView {
    driver_id: String,
    position: Option<GeoPoint>,
}

impl DriverPositionView {
    pub fn new(driver_id: impl Into<String>) -> Self {
        Self {
            driver_id: driver_id.into(),
            position: None,
        }
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    pub fn position(&self) -> Option<GeoPoint> {
        self.position
    }

    /// Fold a snapshot in; returns whether the position changed
    pub fn apply(&mut self, snapshot: &RemotePositionSnapshot) -> bool {
        match snapshot.position_of(&self.driver_id) {
            Some(point) if self.position != Some(point) => {
                self.position = Some(point);
                true
            }
            _ => false,
        }
    }
}

/// Observable poller state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollState {
    /// Latest successfully fetched snapshot
    pub snapshot: Option<RemotePositionSnapshot>,
    /// Last known position of the followed driver
    pub driver_position: Option<GeoPoint>,
    /// Soft error of the latest poll; cleared by the next success
    pub error: Option<String>,
    /// Completed polls, successful or not
    pub polls: u64,
    pub last_polled_at: Option<DateTime<Utc>>,
}

/// Background snapshot poller
#[derive(Debug)]
pub struct RemotePositionPoller {
    state: watch::Receiver<PollState>,
    task: Option<JoinHandle<()>>,
}

impl RemotePositionPoller {
    /// Start polling `source`, following `driver_id` if given
    pub fn spawn<S: SnapshotSource>(source: S, driver_id: Option<String>, every: Duration) -> Self {
        let (state_tx, state) = watch::channel(PollState::default());
        let task = tokio::spawn(run(source, driver_id.map(DriverPositionView::new), every, state_tx));
        Self {
            state,
            task: Some(task),
        }
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    pub fn driver_position(&self) -> Option<GeoPoint> {
        self.state.borrow().driver_position
    }

    /// Cancel the poll timer
    pub fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for RemotePositionPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run<S: SnapshotSource>(
    source: S,
    mut view: Option<DriverPositionView>,
    every: Duration,
    state: watch::Sender<PollState>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let result = match tokio::time::timeout(every, source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(TrackingError::transport(format!(
                "snapshot request timed out after {:?}",
                every
            ))),
        };

        state.send_modify(|current| {
            current.polls += 1;
            current.last_polled_at = Some(Utc::now());
            match result {
                Ok(snapshot) => {
                    if let Some(view) = view.as_mut() {
                        if view.apply(&snapshot) {
                            debug!("Driver {} moved to {:?}", view.driver_id(), view.position());
                        }
                        current.driver_position = view.position();
                    }
                    current.snapshot = Some(snapshot);
                    current.error = None;
                }
                Err(e) => {
                    warn!("Error fetching driver locations: {}", e);
                    current.error = Some(e.to_string());
                }
            }
        });
    }
}
