//! # Location Publisher
//!
//! Streams the device position over the tracking channel while tracking is
//! enabled.
//!
//! ## Features
//!
//! - **Tracking flag**: while enabled the publisher holds exactly one
//!   subscription to the position source; disabling cancels it
//! - **Auto-start**: tracking switches on by itself the first time the
//!   channel opens; a later manual stop is respected across reconnects
//! - **Open-only writes**: a sample is written only if the channel is open
//!   when it arrives, otherwise it is dropped
//!
//! ## Usage
//!
//! ```rust,no_run
//! use courier_track::driver_app::location::{LineReader, LocationPublisher, SampleOptions, SampledSource};
//! # fn example(connection: courier_track::driver_app::connection::ConnectionHandle) {
//! let source = SampledSource::new(LineReader::new(tokio::io::BufReader::new(tokio::io::stdin())));
//! let publisher = LocationPublisher::spawn(source, connection, SampleOptions::default());
//! assert!(!publisher.start_tracking() || publisher.is_tracking());
//! # }
//! ```

pub mod source;

pub use source::{
    LineReader, PositionReader, PositionSample, PositionSource, SampleOptions, SampleStream,
    SampledSource, SensorError,
};

use crate::driver_app::connection::{ConnectionHandle, ConnectionState};
use crate::shared::LocationMessage;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Publishes device fixes over the tracking channel
#[derive(Debug)]
pub struct LocationPublisher {
    tracking: Arc<watch::Sender<bool>>,
    connection: ConnectionHandle,
    task: Option<JoinHandle<()>>,
}

impl LocationPublisher {
    pub fn spawn<S: PositionSource>(
        source: S,
        connection: ConnectionHandle,
        options: SampleOptions,
    ) -> Self {
        let (tracking, _) = watch::channel(false);
        let tracking = Arc::new(tracking);

        let task = tokio::spawn(run(source, connection.clone(), options, Arc::clone(&tracking)));

        Self {
            tracking,
            connection,
            task: Some(task),
        }
    }

    /// Enable tracking. Fails (returns false) unless the channel is open.
    pub fn start_tracking(&self) -> bool {
        if !self.connection.is_open() {
            error!("WebSocket not connected; cannot start tracking");
            return false;
        }
        self.tracking.send_replace(true);
        info!("Location tracking started");
        true
    }

    /// Disable tracking and cancel the sensor subscription
    pub fn stop_tracking(&self) {
        if self.tracking.send_replace(false) {
            info!("Location tracking stopped");
        }
    }

    pub fn is_tracking(&self) -> bool {
        *self.tracking.borrow()
    }

    pub fn watch_tracking(&self) -> watch::Receiver<bool> {
        self.tracking.subscribe()
    }

    /// Stop tracking and wait for the publisher task to exit
    pub async fn shutdown(mut self) {
        self.stop_tracking();
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for LocationPublisher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run<S: PositionSource>(
    source: S,
    connection: ConnectionHandle,
    options: SampleOptions,
    tracking: Arc<watch::Sender<bool>>,
) {
    let mut tracking_rx = tracking.subscribe();
    let mut state_rx = connection.watch_state();
    let mut auto_started = false;
    let mut subscription: Option<SampleStream> = None;
    // Set when the source ends; cleared when tracking is switched off.
    let mut feed_ended = false;

    loop {
        let state = *state_rx.borrow_and_update();
        if !auto_started && state == ConnectionState::Open {
            auto_started = true;
            if !tracking.send_replace(true) {
                info!("Channel open; location tracking auto-started");
            }
        }

        let enabled = *tracking_rx.borrow_and_update();
        if !enabled {
            feed_ended = false;
            if subscription.take().is_some() {
                debug!("Position subscription cancelled");
            }
        } else if subscription.is_none() && !feed_ended {
            debug!("Subscribing to position source");
            subscription = Some(source.watch(options));
        }

        tokio::select! {
            changed = tracking_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    debug!("Connection manager stopped; publisher exiting");
                    break;
                }
            }
            sample = next_sample(&mut subscription) => match sample {
                Some(Ok(sample)) => {
                    if connection.is_open() {
                        connection.send(LocationMessage::from(sample.point));
                    } else {
                        debug!("Channel not open; dropping position sample");
                    }
                }
                Some(Err(SensorError::Timeout(after))) => {
                    warn!("Position read timed out after {:?}", after);
                }
                Some(Err(e)) => error!("Error watching position: {}", e),
                None => {
                    warn!("Position feed ended");
                    subscription = None;
                    feed_ended = true;
                }
            },
        }
    }
}

async fn next_sample(
    subscription: &mut Option<SampleStream>,
) -> Option<Result<PositionSample, SensorError>> {
    match subscription {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
