//! Property-based tests for the reconnect backoff

use courier_track::driver_app::connection::ReconnectPolicy;
use proptest::prelude::*;
use std::time::Duration;

fn policy(base: u64, cap: u64, jitter: u64) -> ReconnectPolicy {
    ReconnectPolicy {
        base: Duration::from_millis(base),
        cap: Duration::from_millis(cap),
        jitter: Duration::from_millis(jitter),
        max_attempts: 10,
    }
}

proptest! {
    #[test]
    fn test_delay_stays_inside_window(
        base in 1u64..5_000,
        cap in 1u64..60_000,
        jitter in 0u64..5_000,
        attempt in 0u32..80,
    ) {
        let policy = policy(base, cap, jitter);
        let floor = policy.base_delay(attempt);
        let delay = policy.delay(attempt);

        prop_assert!(delay >= floor);
        prop_assert!(delay < floor + Duration::from_millis(jitter.max(1)));
    }

    #[test]
    fn test_base_delay_grows_until_cap(
        base in 1u64..5_000,
        cap in 1u64..60_000,
        attempt in 0u32..80,
    ) {
        let policy = policy(base, cap, 0);
        prop_assert!(policy.base_delay(attempt) <= policy.base_delay(attempt + 1));
        prop_assert!(policy.base_delay(attempt) <= Duration::from_millis(cap));
    }

    #[test]
    fn test_explicit_jitter_is_clamped(
        jitter in 1u64..5_000,
        requested in any::<u64>(),
        attempt in 0u32..10,
    ) {
        let policy = policy(1_000, 30_000, jitter);
        let delay = policy.delay_with_jitter(attempt, requested);
        prop_assert!(delay - policy.base_delay(attempt) < Duration::from_millis(jitter));
    }
}
