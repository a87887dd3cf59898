//! Shared Module
//!
//! This module contains types that are independent of any particular driver
//! runtime: the wire messages written to the tracking channel, the bulk
//! snapshot payload, lifecycle events, the error type and the configuration
//! builder.
//!
//! # Overview
//!
//! All types here are plain data and designed for serialization; the async
//! machinery that produces and consumes them lives in `driver_app`.

/// Wire messages and snapshot payload
pub mod message;

/// Connection lifecycle events
pub mod event;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use message::{
    GeoPoint, HeartbeatMessage, LocationMessage, OutboundMessage, RemotePosition,
    RemotePositionSnapshot,
};
pub use event::{ConnectionEvent, HostSignal};
pub use error::TrackingError;
pub use config::{AppConfig, AppConfigBuilder, ConfigError, TrackingSettings};
