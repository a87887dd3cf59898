//! Configuration and record fixtures

use courier_track::driver_app::delivery::{
    CustomerRecord, Order, RecordLocation, RecordLookup, RestaurantRecord,
};
use courier_track::driver_app::Config;
use courier_track::shared::{AppConfig, TrackingError, TrackingSettings};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Generous upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// Settings with short timers so lifecycle tests run in milliseconds
pub fn fast_settings() -> TrackingSettings {
    TrackingSettings {
        heartbeat_interval_ms: 50,
        backoff_base_ms: 10,
        backoff_cap_ms: 50,
        backoff_jitter_ms: 5,
        max_reconnect_attempts: 3,
        poll_interval_ms: 200,
        request_timeout_ms: 300,
        ..TrackingSettings::default()
    }
}

/// Configuration pointing every endpoint at test servers
pub fn test_config(ws_url: &str, http_url: &str) -> Config {
    let builder = AppConfig::builder()
        .tracking_ws_url(ws_url)
        .driver_api_url(http_url)
        .records_api_url(http_url)
        .tracking(fast_settings());
    Config::with_builder(builder).expect("Invalid test configuration")
}

pub fn sample_order() -> Order {
    Order {
        id: "order-1".to_string(),
        restaurant_id: "r1".to_string(),
        customer_id: "c1".to_string(),
        delivery_address: Some("7 Lake Dr".to_string()),
    }
}

/// In-memory records service
#[derive(Default, Clone)]
pub struct StaticLookup {
    pub restaurants: HashMap<String, RestaurantRecord>,
    pub customers: HashMap<String, CustomerRecord>,
}

impl StaticLookup {
    /// Knows restaurant `r1` and customer `c1`
    pub fn seeded() -> Self {
        let mut lookup = Self::default();
        lookup.restaurants.insert(
            "r1".to_string(),
            RestaurantRecord {
                name: Some("Curry House".to_string()),
                location: Some(RecordLocation { latitude: 6.9271, longitude: 79.8612 }),
                address: Some("12 Galle Rd".to_string()),
            },
        );
        lookup.customers.insert(
            "c1".to_string(),
            CustomerRecord {
                location: Some(RecordLocation { latitude: 6.9, longitude: 79.85 }),
                address: None,
            },
        );
        lookup
    }
}

impl RecordLookup for StaticLookup {
    fn restaurant(
        &self,
        restaurant_id: &str,
    ) -> impl Future<Output = Result<Option<RestaurantRecord>, TrackingError>> + Send {
        let record = self.restaurants.get(restaurant_id).cloned();
        async move { Ok(record) }
    }

    fn customer(
        &self,
        customer_id: &str,
    ) -> impl Future<Output = Result<Option<CustomerRecord>, TrackingError>> + Send {
        let record = self.customers.get(customer_id).cloned();
        async move { Ok(record) }
    }
}
