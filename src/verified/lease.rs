//! Pure lease computation functions.
//!
//! All times are Unix seconds, matching the `expiresAt` attribute stored on
//! the lock item.

use crate::constants::LOCK_PARTITION_PREFIX;

/// Compute the lease deadline for an acquisition at `now_secs`.
///
/// # Tiger Style
///
/// - Uses saturating_add to prevent overflow
#[inline]
pub fn compute_expires_at(now_secs: u64, lease_duration_secs: u64) -> u64 {
    now_secs.saturating_add(lease_duration_secs)
}

/// Check whether a stored lease may be taken over at `now_secs`.
///
/// Mirrors the store-side condition `expiresAt < :now`: at exactly the
/// deadline the lease is still held.
#[inline]
pub fn is_lease_expired(expires_at_secs: u64, now_secs: u64) -> bool {
    expires_at_secs < now_secs
}

/// Seconds left on a lease (0 once the deadline has passed).
#[inline]
pub fn remaining_lease_secs(expires_at_secs: u64, now_secs: u64) -> u64 {
    expires_at_secs.saturating_sub(now_secs)
}

/// Partition key value for a resource: `lock#{resource_id}`.
#[inline]
pub fn lock_partition_key(resource_id: &str) -> String {
    format!("{LOCK_PARTITION_PREFIX}{resource_id}")
}
