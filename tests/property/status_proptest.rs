//! Property-based tests for the delivery state machine

use crate::common::{sample_order, StaticLookup};
use courier_track::driver_app::delivery::{DeliveryStateMachine, DeliveryStatus};
use courier_track::driver_app::LocalStore;
use proptest::prelude::*;

fn status_value() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("PICKUP".to_string()),
        Just("OUTFORDELIVERY".to_string()),
        Just("COMPLETED".to_string()),
        Just("pickup".to_string()),
        "[A-Z]{0,12}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_status_never_moves_backwards(updates in prop::collection::vec(status_value(), 0..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let store = LocalStore::in_memory().await.unwrap();
            let mut machine = DeliveryStateMachine::new(StaticLookup::seeded(), store);
            assert!(machine.accept_delivery(&sample_order()).await);

            let mut accepted = 0;
            let mut last = DeliveryStatus::Pickup;
            for update in &updates {
                if machine.update_delivery_status(update).await {
                    accepted += 1;
                }
                let current = machine.current().unwrap().status;
                assert!(current >= last);
                last = current;
            }

            let delivery = machine.current().unwrap();
            assert_eq!(delivery.history.len(), 1 + accepted);
            assert_eq!(delivery.history.last().map(|change| change.status), Some(delivery.status));
        });
    }
}
