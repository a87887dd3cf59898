//! Position sources.
//!
//! A [`PositionSource`] yields a lazy stream of device fixes. Each call to
//! [`PositionSource::watch`] is a new subscription; dropping the stream
//! unsubscribes. [`SampledSource`] turns any one-shot [`PositionReader`] into
//! such a stream and enforces the per-read timeout and the maximum sample age.

use crate::shared::config::TrackingSettings;
use crate::shared::GeoPoint;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One device fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub point: GeoPoint,
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn now(point: GeoPoint) -> Self {
        Self {
            point,
            captured_at: Utc::now(),
        }
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.captured_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Sampling options passed to the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleOptions {
    pub high_accuracy: bool,
    /// Older cached fixes are discarded
    pub maximum_age: Duration,
    /// Upper bound for one read
    pub timeout: Duration,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self::from(&TrackingSettings::default())
    }
}

impl From<&TrackingSettings> for SampleOptions {
    fn from(settings: &TrackingSettings) -> Self {
        Self {
            high_accuracy: settings.high_accuracy,
            maximum_age: Duration::from_millis(settings.sample_max_age_ms),
            timeout: Duration::from_millis(settings.sample_timeout_ms),
        }
    }
}

/// Sensor errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SensorError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    Unavailable(String),

    #[error("position read timed out after {0:?}")]
    Timeout(Duration),
}

impl SensorError {
    /// Whether the subscription ends after this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Timeout(_))
    }
}

pub type SampleStream = BoxStream<'static, Result<PositionSample, SensorError>>;

/// Subscribable stream of device fixes
pub trait PositionSource: Send + Sync + 'static {
    fn watch(&self, options: SampleOptions) -> SampleStream;
}

/// One-shot position read
pub trait PositionReader: Send + 'static {
    fn read(
        &mut self,
        high_accuracy: bool,
    ) -> impl Future<Output = Result<PositionSample, SensorError>> + Send;
}

/// Adapts a [`PositionReader`] into a [`PositionSource`]
///
/// Subscriptions share the reader; only one read is in flight at a time.
pub struct SampledSource<R> {
    reader: Arc<Mutex<R>>,
}

impl<R: PositionReader> SampledSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Arc::new(Mutex::new(reader)),
        }
    }
}

struct Subscription<R> {
    reader: Arc<Mutex<R>>,
    options: SampleOptions,
    finished: bool,
}

impl<R: PositionReader> PositionSource for SampledSource<R> {
    fn watch(&self, options: SampleOptions) -> SampleStream {
        let subscription = Subscription {
            reader: Arc::clone(&self.reader),
            options,
            finished: false,
        };

        stream::unfold(subscription, |mut sub| async move {
            if sub.finished {
                return None;
            }
            loop {
                let read = {
                    let mut reader = sub.reader.lock().await;
                    tokio::time::timeout(sub.options.timeout, reader.read(sub.options.high_accuracy))
                        .await
                };
                match read {
                    Err(_) => return Some((Err(SensorError::Timeout(sub.options.timeout)), sub)),
                    Ok(Err(e)) => {
                        sub.finished = e.is_fatal();
                        return Some((Err(e), sub));
                    }
                    Ok(Ok(sample)) => {
                        let age = sample.age_at(Utc::now());
                        if age > sub.options.maximum_age {
                            debug!("Discarding stale position sample ({:?} old)", age);
                            continue;
                        }
                        return Some((Ok(sample), sub));
                    }
                }
            }
        })
        .boxed()
    }
}

/// Reads `lat,lng` lines from a text feed such as stdin or a NMEA bridge
pub struct LineReader<B> {
    lines: Lines<B>,
}

impl<B: AsyncBufRead + Unpin + Send + 'static> LineReader<B> {
    pub fn new(input: B) -> Self {
        Self { lines: input.lines() }
    }
}

impl<B: AsyncBufRead + Unpin + Send + 'static> PositionReader for LineReader<B> {
    fn read(
        &mut self,
        _high_accuracy: bool,
    ) -> impl Future<Output = Result<PositionSample, SensorError>> + Send {
        async move {
            loop {
                let line = self
                    .lines
                    .next_line()
                    .await
                    .map_err(|e| SensorError::Unavailable(e.to_string()))?;
                let Some(line) = line else {
                    return Err(SensorError::Unavailable("position feed closed".to_string()));
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_fix(&line) {
                    Some(point) => return Ok(PositionSample::now(point)),
                    None => warn!("Ignoring malformed position line: {:?}", line),
                }
            }
        }
    }
}

/// Parse `lat,lng` with both values in range
pub fn parse_fix(line: &str) -> Option<GeoPoint> {
    let (lat, lng) = line.trim().split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    let in_range = (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng);
    in_range.then(|| GeoPoint::new(lat, lng))
}
