//! Constants for the lease lock.
//!
//! Key layout on the backing store and the defaults used when configuration
//! omits a value.
//!
//! Tiger Style: Constants are fixed and immutable, enforced at compile time.

// ============================================================================
// Item Layout
// ============================================================================

/// Prefix of the partition key value: `lock#{resource_id}`.
pub const LOCK_PARTITION_PREFIX: &str = "lock#";

/// Literal sort key value shared by every lock item.
pub const LOCK_SORT_KEY: &str = "metadata#lock";

/// Attribute holding the current owner id (string).
pub const ATTR_OWNER_ID: &str = "ownerId";

/// Attribute holding the lease deadline (integer Unix seconds).
///
/// Eligible for store-native expiry cleanup.
pub const ATTR_EXPIRES_AT: &str = "expiresAt";

// ============================================================================
// Lock Defaults
// ============================================================================

/// Default lock table name.
pub const DEFAULT_TABLE_NAME: &str = "locks";

/// Default partition key attribute name.
pub const DEFAULT_PARTITION_KEY_ATTRIBUTE: &str = "pk";

/// Default sort key attribute name.
pub const DEFAULT_SORT_KEY_ATTRIBUTE: &str = "sk";

/// Default lease duration (30 seconds).
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 30;

// ============================================================================
// Retry Defaults
// ============================================================================

/// Default maximum attempts, first attempt included.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt (100ms).
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;

/// Default cap on a single backoff delay (5 seconds).
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Default exponential growth factor.
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default maximum jitter as a fraction of the capped delay.
pub const DEFAULT_RETRY_JITTER_FACTOR: f64 = 0.25;

// ============================================================================
// Compile-time assertions
// ============================================================================

const _: () = assert!(DEFAULT_LEASE_DURATION_SECS > 0);
const _: () = assert!(DEFAULT_RETRY_MAX_ATTEMPTS >= 1);
const _: () = assert!(DEFAULT_RETRY_BASE_DELAY_MS > 0);
const _: () = assert!(DEFAULT_RETRY_BASE_DELAY_MS <= DEFAULT_RETRY_MAX_DELAY_MS);
const _: () = assert!(!LOCK_PARTITION_PREFIX.is_empty());
const _: () = assert!(!DEFAULT_PARTITION_KEY_ATTRIBUTE.is_empty());
const _: () = assert!(!DEFAULT_SORT_KEY_ATTRIBUTE.is_empty());
