//! Connection state and close-code classification.

use serde::Serialize;
use std::fmt;

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Policy violation, used by the tracking endpoint to reject credentials
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Connection dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close frame without a status code
pub const CLOSE_NO_STATUS: u16 = 1005;

/// State of the single tracking channel owned by the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
    /// Terminal for the current credentials
    AuthFailed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    /// States in which an out-of-band reconnect trigger is ignored
    pub fn is_live(self) -> bool {
        matches!(self, Self::Open | Self::Connecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::AuthFailed => "auth_failed",
        };
        f.write_str(name)
    }
}

/// What a close code means for the reconnection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Deliberate close; stay disconnected
    Normal,
    /// Credentials rejected; never retried automatically
    AuthRejected,
    /// Anything else; retried with backoff
    Transient,
}

impl CloseDisposition {
    pub fn from_code(code: u16) -> Self {
        match code {
            CLOSE_NORMAL => Self::Normal,
            CLOSE_POLICY_VIOLATION => Self::AuthRejected,
            _ => Self::Transient,
        }
    }
}
