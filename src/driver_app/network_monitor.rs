//! # Network Monitor
//!
//! Tracks host connectivity and app visibility, and turns the interesting
//! transitions into reconnect triggers for the connection manager.
//!
//! ## Features
//!
//! - **Connectivity**: online / limited / offline as reported by the host
//! - **Visibility**: foreground / background as reported by the host
//! - **Reconnect triggers**: regaining connectivity sends
//!   [`HostSignal::NetworkOnline`], returning to the foreground sends
//!   [`HostSignal::Foregrounded`]

use crate::driver_app::connection::ConnectionHandle;
use crate::shared::HostSignal;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Limited,
    Offline,
}

impl NetworkStatus {
    pub fn is_reachable(self) -> bool {
        !matches!(self, Self::Offline)
    }
}

pub struct NetworkMonitor {
    current_status: NetworkStatus,
    visible: bool,
    connection: ConnectionHandle,
}

impl NetworkMonitor {
    /// Start assuming the host is online and in the foreground
    pub fn new(connection: ConnectionHandle) -> Self {
        Self {
            current_status: NetworkStatus::Online,
            visible: true,
            connection,
        }
    }

    pub fn get_status(&self) -> NetworkStatus {
        self.current_status
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Record a connectivity change; returns the signal sent, if any
    pub fn report_network(&mut self, status: NetworkStatus) -> Option<HostSignal> {
        let was_reachable = self.current_status.is_reachable();
        self.current_status = status;
        debug!("Network status: {:?}", status);

        (!was_reachable && status.is_reachable()).then(|| self.signal(HostSignal::NetworkOnline))
    }

    /// Record a visibility change; returns the signal sent, if any
    pub fn report_visibility(&mut self, visible: bool) -> Option<HostSignal> {
        let was_visible = self.visible;
        self.visible = visible;

        (!was_visible && visible).then(|| self.signal(HostSignal::Foregrounded))
    }

    fn signal(&self, signal: HostSignal) -> HostSignal {
        self.connection.host_signal(signal);
        signal
    }
}
