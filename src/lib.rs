//! Courier Track - Driver Tracking Library
//!
//! Courier Track is the real-time driver tracking layer of a food delivery
//! platform. A driver's client keeps one authenticated WebSocket channel to
//! the tracking service, streams its position over it, survives network
//! interruptions with backoff-based reconnection and keeps the delivery it
//! is working on across restarts.
//!
//! # Overview
//!
//! This library provides:
//! - A connection manager with heartbeat, backoff and auth-failure handling
//! - A location publisher fed by any position source
//! - A forward-only delivery state machine mirrored to a local store
//! - A poller of the bulk position snapshot for map views
//!
//! # Module Structure
//!
//! - **`shared`** - Types independent of the runtime
//!   - Wire messages and the position snapshot
//!   - Connection events and host signals
//!   - Error and configuration types
//!
//! - **`driver_app`** - The driver runtime (tokio tasks)
//!   - Connection manager, location publisher, delivery state machine
//!   - Snapshot poller and network monitor
//!   - Local SQLite store
//!
//! # Usage
//!
//! ```rust,no_run
//! use courier_track::driver_app::{Config, ConnectionManager, Credentials, LocalStore, WebSocketConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let store = LocalStore::open(&config.store_path()).await?;
//! let manager = ConnectionManager::spawn(WebSocketConnector, config, store);
//! manager.connect(Credentials::from_token("eyJ...")?);
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! Each component runs as its own tokio task and is the sole owner of its
//! state. Callers interact through handles that send commands, and observe
//! state through `watch` receivers and `broadcast` events. Dropping a
//! component's owner aborts its task and with it every timer it holds.
//!
//! # Error Handling
//!
//! - `Result<T, TrackingError>` for fallible I/O (transport, storage, HTTP)
//! - Failures inside the running components are logged with `tracing` and
//!   folded into observable state instead of being returned

/// Shared types and data structures
pub mod shared;

/// Driver tracking runtime
pub mod driver_app;
