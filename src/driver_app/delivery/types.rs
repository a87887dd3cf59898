/**
 * Delivery Types
 *
 * The resident delivery record, its forward-only status and the order
 * payload a driver accepts. Field names follow the JSON kept in the local
 * store under `currentDelivery` (camelCase).
 */
use crate::shared::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Delivery status, ordered PICKUP < OUTFORDELIVERY
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Pickup,
    OutForDelivery,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pickup => "PICKUP",
            Self::OutForDelivery => "OUTFORDELIVERY",
        }
    }

    /// Whether moving from `self` to `next` respects the forward order
    pub fn can_advance_to(self, next: DeliveryStatus) -> bool {
        next >= self
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown delivery status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PICKUP" => Ok(Self::Pickup),
            "OUTFORDELIVERY" => Ok(Self::OutForDelivery),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One entry in the status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
}

impl StatusChange {
    pub fn now(status: DeliveryStatus) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
        }
    }
}

/// A geocoded place with its display address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, alias = "fullAddress")]
    pub address: String,
}

impl Place {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// The delivery a driver is currently working on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub order_id: String,
    pub status: DeliveryStatus,
    pub restaurant_location: Place,
    pub delivery_address: Place,
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

impl Delivery {
    /// Where the driver is heading: the restaurant until pickup is done,
    /// the customer afterwards
    pub fn destination(&self) -> GeoPoint {
        match self.status {
            DeliveryStatus::Pickup => self.restaurant_location.point(),
            DeliveryStatus::OutForDelivery => self.delivery_address.point(),
        }
    }
}

/// An order offered to the driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub restaurant_id: String,
    #[serde(alias = "userId")]
    pub customer_id: String,
    /// Free-text delivery address entered by the customer
    #[serde(default)]
    pub delivery_address: Option<String>,
}
