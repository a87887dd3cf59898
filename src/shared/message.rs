/**
 * Tracking Wire Messages
 *
 * Outbound frames sent over the tracking channel and the payload of the bulk
 * position snapshot. Outbound frames are fire-and-forget JSON text:
 *
 * - heartbeat: `{"type":"ping"}`
 * - position:  `{"latitude":<f64>,"longitude":<f64>}`
 */
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A map coordinate as consumed by map views
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Keep-alive frame sent on a fixed cadence while the channel is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HeartbeatMessage {
    Ping,
}

/// One accepted position sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationMessage {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<GeoPoint> for LocationMessage {
    fn from(point: GeoPoint) -> Self {
        Self {
            latitude: point.lat,
            longitude: point.lng,
        }
    }
}

/// Any frame the driver client writes to the channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Heartbeat(HeartbeatMessage),
    Location(LocationMessage),
}

impl OutboundMessage {
    pub fn ping() -> Self {
        Self::Heartbeat(HeartbeatMessage::Ping)
    }

    /// Serialize to the JSON text frame written on the wire
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<LocationMessage> for OutboundMessage {
    fn from(message: LocationMessage) -> Self {
        Self::Location(message)
    }
}

/// Last known position of one connected driver, as reported by the bulk read.
/// Extra fields in the payload are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemotePosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<RemotePosition> for GeoPoint {
    fn from(position: RemotePosition) -> Self {
        GeoPoint::new(position.latitude, position.longitude)
    }
}

/// Point-in-time mapping of every connected driver to its last position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemotePositionSnapshot(pub HashMap<String, RemotePosition>);

impl RemotePositionSnapshot {
    pub fn position_of(&self, driver_id: &str) -> Option<GeoPoint> {
        self.0.get(driver_id).copied().map(GeoPoint::from)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
