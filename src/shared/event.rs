/**
 * Connection Lifecycle Events
 *
 * Events published by the connection manager to any number of observers.
 * They complement the state snapshot: state says where the channel is now,
 * events say what just happened (and carry the re-authentication signal).
 */
use serde::Serialize;
use std::time::Duration;

/// Lifecycle event of the tracking channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// Channel opened for the driver
    Opened { driver_id: String },
    /// Channel closed with the given close code
    Closed { code: u16, reason: String },
    /// A reconnect attempt was scheduled
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Retry budget spent; no automatic retries until an explicit connect
    ReconnectExhausted { attempts: u32 },
    /// Credentials were rejected or expired; the host must re-authenticate
    ReauthenticationRequired { reason: String },
}

impl ConnectionEvent {
    /// Whether the event leaves the channel unusable without caller action
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ReconnectExhausted { .. } | Self::ReauthenticationRequired { .. }
        )
    }
}

/// Host-level signal that may warrant an out-of-band reconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// The host became visible / foregrounded again
    Foregrounded,
    /// Network connectivity was regained
    NetworkOnline,
}
