//! Driver App Module
//!
//! The driver-side tracking runtime: it keeps the tracking channel alive,
//! streams the device position over it, holds the resident delivery and
//! polls the peers' position snapshot.
//!
//! # Architecture
//!
//! - **`config`** - Endpoint URLs and timer settings (file + environment)
//! - **`auth`** - Bearer token claims and driver credentials
//! - **`local_db`** - Local SQLite key/value store for durable client state
//! - **`connection`** - Connection manager, backoff and channel transport
//! - **`location`** - Position sources and the location publisher
//! - **`delivery`** - Delivery state machine and record lookups
//! - **`poller`** - Remote position snapshot poller
//! - **`network_monitor`** - Connectivity and visibility reconnect triggers
//! - **`main`** - `driver-agent` binary entry point
//!
//! # Module Structure
//!
//! ```text
//! driver_app/
//! ├── mod.rs             - Module exports and documentation
//! ├── main.rs            - driver-agent binary
//! ├── config.rs          - Configuration management
//! ├── auth.rs            - Token claims
//! ├── local_db/          - Durable key/value store
//! ├── connection/        - Connection manager
//! ├── location/          - Location publisher
//! ├── delivery/          - Delivery state machine
//! ├── poller.rs          - Snapshot poller
//! └── network_monitor.rs - Host signals
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod delivery;
pub mod local_db;
pub mod location;
pub mod network_monitor;
pub mod poller;

// Re-export commonly used types
pub use auth::Credentials;
pub use config::Config;
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState, WebSocketConnector};
pub use delivery::{Delivery, DeliveryStateMachine, DeliveryStatus, HttpRecordLookup, Order};
pub use local_db::LocalStore;
pub use location::{LocationPublisher, SampleOptions};
pub use network_monitor::{NetworkMonitor, NetworkStatus};
pub use poller::{HttpSnapshotSource, RemotePositionPoller};
