//! Restaurant and customer record lookups used when accepting an order.
//!
//! The records service is an external collaborator: a lookup returns the
//! record or its absence (HTTP 404). Any other failure is an error.

use crate::driver_app::config::Config;
use crate::shared::{GeoPoint, TrackingError};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RecordLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<RecordLocation> for GeoPoint {
    fn from(location: RecordLocation) -> Self {
        GeoPoint::new(location.latitude, location.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RestaurantRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<RecordLocation>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomerRecord {
    #[serde(default)]
    pub location: Option<RecordLocation>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Read-by-id access to the records service
pub trait RecordLookup: Send + Sync {
    fn restaurant(
        &self,
        restaurant_id: &str,
    ) -> impl Future<Output = Result<Option<RestaurantRecord>, TrackingError>> + Send;

    fn customer(
        &self,
        customer_id: &str,
    ) -> impl Future<Output = Result<Option<CustomerRecord>, TrackingError>> + Send;
}

/// [`RecordLookup`] over HTTP
///
/// Requests are bounded by the configured request timeout.
#[derive(Debug, Clone)]
pub struct HttpRecordLookup {
    client: reqwest::Client,
    config: Config,
}

impl HttpRecordLookup {
    pub fn new(config: Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, url: String) -> Result<Option<T>, TrackingError> {
        let response = self
            .client
            .get(&url)
            .timeout(self.config.tracking().request_timeout())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("No record at {}", url);
            return Ok(None);
        }
        let record = response.error_for_status()?.json::<T>().await?;
        Ok(Some(record))
    }
}

impl RecordLookup for HttpRecordLookup {
    fn restaurant(
        &self,
        restaurant_id: &str,
    ) -> impl Future<Output = Result<Option<RestaurantRecord>, TrackingError>> + Send {
        self.fetch(self.config.restaurant_url(restaurant_id))
    }

    fn customer(
        &self,
        customer_id: &str,
    ) -> impl Future<Output = Result<Option<CustomerRecord>, TrackingError>> + Send {
        self.fetch(self.config.customer_url(customer_id))
    }
}
