//! # Delivery State Machine
//!
//! Holds the single resident delivery of the driver, mirrors it to the local
//! store on every change and publishes read-only snapshots.
//!
//! ```text
//! None --accept--> PICKUP --update--> OUTFORDELIVERY --complete--> None
//! ```
//!
//! ## Rules
//!
//! - `accept_delivery` resolves the restaurant and customer coordinates first;
//!   if either record is missing the transition is aborted and nothing changes
//! - `update_delivery_status` takes raw text; values other than `PICKUP` and
//!   `OUTFORDELIVERY`, and backward moves, are no-ops
//! - every successful transition appends exactly one history entry
//! - `complete_delivery` erases the stored record; no terminal state is kept
//!
//! Failures are logged and exposed through [`DeliveryStateMachine::last_error`];
//! nothing here returns an error to the caller.

pub mod lookup;
pub mod types;

pub use lookup::{CustomerRecord, HttpRecordLookup, RecordLocation, RecordLookup, RestaurantRecord};
pub use types::{Delivery, DeliveryStatus, Order, Place, StatusChange, UnknownStatus};

use crate::driver_app::local_db::{LocalStore, CURRENT_DELIVERY_KEY};
use crate::shared::{GeoPoint, TrackingError};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

/// Why a transition was refused
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery {0} is already active")]
    AlreadyActive(String),

    #[error("restaurant {0} not found")]
    RestaurantNotFound(String),

    #[error("customer {0} not found")]
    CustomerNotFound(String),

    #[error("{0} record has no location")]
    MissingLocation(&'static str),

    #[error("record lookup failed: {0}")]
    Lookup(#[from] TrackingError),
}

/// Delivery lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    /// A new delivery became resident; fired once per delivery
    Activated { order_id: String, destination: GeoPoint },
    /// A resident delivery was reloaded from the local store
    Restored { order_id: String, status: DeliveryStatus },
    StatusChanged { order_id: String, status: DeliveryStatus },
    Completed { order_id: String },
}

/// Owner of the resident delivery
pub struct DeliveryStateMachine<L> {
    lookup: L,
    store: LocalStore,
    snapshots: watch::Sender<Option<Delivery>>,
    events: broadcast::Sender<DeliveryEvent>,
    last_error: Option<String>,
}

impl<L: RecordLookup> DeliveryStateMachine<L> {
    /// Create an empty machine; call [`restore`](Self::restore) to reload
    /// the stored delivery
    pub fn new(lookup: L, store: LocalStore) -> Self {
        let (snapshots, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            lookup,
            store,
            snapshots,
            events,
            last_error: None,
        }
    }

    /// Reload the resident delivery from the local store.
    ///
    /// An unreadable record is discarded.
    pub async fn restore(&mut self) -> Option<Delivery> {
        match self.store.load_json::<Delivery>(CURRENT_DELIVERY_KEY).await {
            Ok(Some(delivery)) => {
                info!("Restored delivery {} ({})", delivery.order_id, delivery.status);
                self.snapshots.send_replace(Some(delivery.clone()));
                self.emit(DeliveryEvent::Restored {
                    order_id: delivery.order_id.clone(),
                    status: delivery.status,
                });
                Some(delivery)
            }
            Ok(None) => None,
            Err(TrackingError::Serialization(e)) => {
                warn!("Discarding unreadable stored delivery: {}", e);
                if let Err(e) = self.store.remove(CURRENT_DELIVERY_KEY).await {
                    warn!("Failed to remove stored delivery: {}", e);
                }
                None
            }
            Err(e) => {
                warn!("Failed to load stored delivery: {}", e);
                self.last_error = Some(e.to_string());
                None
            }
        }
    }

    pub fn current(&self) -> Option<Delivery> {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Delivery>> {
        self.snapshots.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.events.subscribe()
    }

    /// Error of the last refused transition, if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn emit(&self, event: DeliveryEvent) {
        let _ = self.events.send(event);
    }

    /// Make `order` the resident delivery in `PICKUP`.
    ///
    /// Returns false (state unchanged) if a delivery is already resident or
    /// a coordinate lookup fails.
    pub async fn accept_delivery(&mut self, order: &Order) -> bool {
        match self.resolve(order).await {
            Ok(delivery) => {
                let destination = delivery.destination();
                info!("Accepted delivery {}", delivery.order_id);
                self.commit(delivery).await;
                self.last_error = None;
                self.emit(DeliveryEvent::Activated {
                    order_id: order.id.clone(),
                    destination,
                });
                true
            }
            Err(e) => {
                warn!("Cannot accept delivery {}: {}", order.id, e);
                self.last_error = Some(e.to_string());
                false
            }
        }
    }

    async fn resolve(&self, order: &Order) -> Result<Delivery, DeliveryError> {
        let resident = self.snapshots.borrow().as_ref().map(|d| d.order_id.clone());
        if let Some(order_id) = resident {
            return Err(DeliveryError::AlreadyActive(order_id));
        }

        let (restaurant, customer) = tokio::join!(
            self.lookup.restaurant(&order.restaurant_id),
            self.lookup.customer(&order.customer_id),
        );
        let restaurant =
            restaurant?.ok_or_else(|| DeliveryError::RestaurantNotFound(order.restaurant_id.clone()))?;
        let customer =
            customer?.ok_or_else(|| DeliveryError::CustomerNotFound(order.customer_id.clone()))?;

        let pickup = restaurant.location.ok_or(DeliveryError::MissingLocation("restaurant"))?;
        let dropoff = customer.location.ok_or(DeliveryError::MissingLocation("customer"))?;

        Ok(Delivery {
            order_id: order.id.clone(),
            status: DeliveryStatus::Pickup,
            restaurant_location: Place {
                lat: pickup.latitude,
                lng: pickup.longitude,
                address: restaurant.address.unwrap_or_default(),
            },
            delivery_address: Place {
                lat: dropoff.latitude,
                lng: dropoff.longitude,
                address: order
                    .delivery_address
                    .clone()
                    .or(customer.address)
                    .unwrap_or_default(),
            },
            history: vec![StatusChange::now(DeliveryStatus::Pickup)],
        })
    }

    /// Advance the resident delivery to `status`.
    ///
    /// Unknown values, backward moves and calls without a resident delivery
    /// change nothing and return false.
    pub async fn update_delivery_status(&mut self, status: &str) -> bool {
        let status = match status.parse::<DeliveryStatus>() {
            Ok(status) => status,
            Err(e) => {
                debug!("Ignoring status update: {}", e);
                return false;
            }
        };
        let Some(mut delivery) = self.current() else {
            debug!("No active delivery; ignoring status {}", status);
            return false;
        };
        if !delivery.status.can_advance_to(status) {
            warn!("Refusing to move delivery {} from {} back to {}", delivery.order_id, delivery.status, status);
            return false;
        }

        delivery.status = status;
        delivery.history.push(StatusChange::now(status));
        let order_id = delivery.order_id.clone();
        self.commit(delivery).await;
        info!("Delivery {} is now {}", order_id, status);
        self.emit(DeliveryEvent::StatusChanged { order_id, status });
        true
    }

    /// Drop the resident delivery and its stored record.
    ///
    /// The delivery stays resident when the stored record cannot be erased,
    /// so a restart never resurrects a delivery the app reported as done.
    pub async fn complete_delivery(&mut self) -> bool {
        let Some(delivery) = self.current() else {
            return false;
        };
        if let Err(e) = self.store.remove(CURRENT_DELIVERY_KEY).await {
            warn!("Failed to erase delivery {}: {}", delivery.order_id, e);
            self.last_error = Some(TrackingError::from(e).to_string());
            return false;
        }
        self.snapshots.send_replace(None);
        info!("Completed delivery {}", delivery.order_id);
        self.emit(DeliveryEvent::Completed { order_id: delivery.order_id });
        true
    }

    async fn commit(&mut self, delivery: Delivery) {
        if let Err(e) = self.store.save_json(CURRENT_DELIVERY_KEY, &delivery).await {
            warn!("Failed to persist delivery: {}", e);
            self.last_error = Some(e.to_string());
        }
        self.snapshots.send_replace(Some(delivery));
    }
}
