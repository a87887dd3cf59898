//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Signed driver tokens
//! - A loopback tracking server speaking WebSocket
//! - Configuration and record fixtures

pub mod fixtures;
pub mod tracking_server;

// Re-export commonly used utilities
pub use auth_helpers::*;
pub use fixtures::*;
pub use tracking_server::*;
