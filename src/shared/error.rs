//! Shared Error Types
//!
//! This module defines the error type used across the tracking runtime.
//! Runtime failures of the connection, publisher and poller are folded into
//! observable state instead of being returned; `TrackingError` is what those
//! components log and what fallible construction (store, config, transport
//! handshake) returns.
//!
//! # Error Categories
//!
//! - `Transport` - channel could not be opened or broke mid-stream
//! - `AuthRejected` - the tracking endpoint refused the bearer token
//! - `Serialization` - JSON encoding/decoding failures
//! - `Storage` - local durable store failures
//! - `Http` - bulk snapshot / record lookup request failures
//! - `Token` - the bearer token could not be decoded locally
//!
//! Configuration problems have their own `ConfigError`, returned by
//! `Config::load` before any of the runtime starts.
//!
//! # Usage
//!
//! ```rust
//! use courier_track::shared::error::TrackingError;
//!
//! let error = TrackingError::transport("connection reset");
//! assert_eq!(error.to_string(), "Transport error: connection reset");
//! ```
use thiserror::Error;

/// Errors surfaced by the tracking runtime
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The channel could not be established or failed while open
    #[error("Transport error: {message}")]
    Transport {
        /// Human-readable error message
        message: String,
    },

    /// The endpoint rejected the credentials (close code 1008 or HTTP 401/403)
    #[error("Authentication rejected: {reason}")]
    AuthRejected {
        /// Reason given by the server, if any
        reason: String,
    },

    /// JSON serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local store error
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Bearer token could not be decoded
    #[error("Token error: {message}")]
    Token {
        /// Human-readable error message
        message: String,
    },
}

impl TrackingError {
    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new auth rejection error
    pub fn auth_rejected(reason: impl Into<String>) -> Self {
        Self::AuthRejected {
            reason: reason.into(),
        }
    }

    /// Create a new token error
    pub fn token(message: impl Into<String>) -> Self {
        Self::Token {
            message: message.into(),
        }
    }
}
