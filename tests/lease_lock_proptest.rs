/// Property-based tests for the pure lease lock functions.
///
/// Verifies across wide input ranges:
/// - Backoff delays never exceed the cap and never shrink between attempts
/// - Jitter stays within `[capped, capped * (1 + factor)]`
/// - A freshly computed lease is never considered expired
/// - Store conditions agree with the expiry check
use std::time::Duration;

use aspen_lease_lock::DeleteCondition;
use aspen_lease_lock::LockRecord;
use aspen_lease_lock::PutCondition;
use aspen_lease_lock::RetryOptions;
use aspen_lease_lock::verified::apply_jitter_ms;
use aspen_lease_lock::verified::compute_backoff_delay;
use aspen_lease_lock::verified::compute_capped_delay_ms;
use aspen_lease_lock::verified::compute_expires_at;
use aspen_lease_lock::verified::is_lease_expired;
use aspen_lease_lock::verified::remaining_lease_secs;
use proptest::prelude::*;

fn arbitrary_retry_options() -> impl Strategy<Value = RetryOptions> {
    (1u64..10_000, 0u64..100_000, 1.01f64..10.0, any::<bool>(), 0.0f64..=1.0).prop_map(
        |(base_delay_ms, extra_ms, backoff_multiplier, use_jitter, jitter_factor)| RetryOptions {
            enabled: true,
            max_attempts: 10,
            base_delay_ms,
            max_delay_ms: base_delay_ms + extra_ms,
            backoff_multiplier,
            use_jitter,
            jitter_factor,
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_capped_delay_within_bounds(
        failures in 1u32..64,
        base in 0u64..10_000,
        extra in 0u64..100_000,
        multiplier in 1.0f64..8.0,
    ) {
        let max = base + extra;
        let delay = compute_capped_delay_ms(failures, base, max, multiplier);
        prop_assert!(delay >= base as f64);
        prop_assert!(delay <= max as f64);
    }

    #[test]
    fn prop_capped_delay_is_monotonic(
        failures in 1u32..63,
        base in 1u64..10_000,
        extra in 0u64..100_000,
        multiplier in 1.0f64..8.0,
    ) {
        let max = base + extra;
        let current = compute_capped_delay_ms(failures, base, max, multiplier);
        let next = compute_capped_delay_ms(failures + 1, base, max, multiplier);
        prop_assert!(next >= current);
    }

    #[test]
    fn prop_jitter_within_window(
        capped in 0.0f64..1_000_000.0,
        factor in 0.0f64..=1.0,
        sample in 0.0f64..1.0,
    ) {
        let delay = apply_jitter_ms(capped, factor, sample);
        prop_assert!(delay >= capped);
        prop_assert!(delay <= capped * (1.0 + factor) + 1e-6);
    }

    #[test]
    fn prop_backoff_delay_never_exceeds_jittered_cap(
        options in arbitrary_retry_options(),
        failures in 1u32..32,
        sample in 0.0f64..1.0,
    ) {
        let delay = compute_backoff_delay(failures, &options, sample);
        let ceiling_ms = options.max_delay_ms as f64 * (1.0 + options.jitter_factor) + 1.0;
        prop_assert!(delay <= Duration::from_secs_f64(ceiling_ms / 1_000.0));
        let floor = Duration::from_millis(options.base_delay_ms).saturating_sub(Duration::from_millis(1));
        prop_assert!(delay >= floor);
    }

    #[test]
    fn prop_fresh_lease_not_expired(now in any::<u64>(), lease in 0u64..1_000_000) {
        let expires_at = compute_expires_at(now, lease);
        prop_assert!(!is_lease_expired(expires_at, now));
        prop_assert!(expires_at >= now);
        if let Some(expected) = now.checked_add(lease) {
            prop_assert_eq!(remaining_lease_secs(expires_at, now), lease);
            prop_assert_eq!(expires_at, expected);
        }
    }

    #[test]
    fn prop_put_condition_matches_expiry(expires_at in any::<u64>(), now in any::<u64>()) {
        let record = LockRecord { owner_id: "owner".to_string(), expires_at };
        let condition = PutCondition::AbsentOrExpired { now_secs: now };
        prop_assert_eq!(condition.is_satisfied_by(Some(&record)), expires_at < now);
        prop_assert!(condition.is_satisfied_by(None));
    }

    #[test]
    fn prop_delete_condition_requires_exact_owner(
        stored in "[a-z0-9-]{1,16}",
        caller in "[a-z0-9-]{1,16}",
    ) {
        let record = LockRecord { owner_id: stored.clone(), expires_at: 0 };
        let condition = DeleteCondition::OwnerEquals { owner_id: caller.clone() };
        prop_assert_eq!(condition.is_satisfied_by(Some(&record)), stored == caller);
        prop_assert!(!condition.is_satisfied_by(None));
    }
}
