//! Verified pure functions for the lease lock.
//!
//! This module implements the "Functional Core, Imperative Shell" pattern: the
//! timing math, lease arithmetic and error classification live here as
//! deterministic, side-effect free functions, while the coordinator and retry
//! engine perform the I/O.
//!
//! # Module Organization
//!
//! - [`backoff`]: Exponential backoff, delay capping, jitter
//! - [`lease`]: Lease deadlines, expiry checks, key layout
//! - [`classify`]: Retry eligibility of store errors
//!
//! # Tiger Style
//!
//! - Saturating arithmetic for all integer calculations
//! - Time passed as an explicit parameter (no system clock reads)
//! - Randomness passed as an explicit sample in `[0, 1)`
//! - No panics - all functions are total

pub mod backoff;
pub mod classify;
pub mod lease;

// ============================================================================
// Re-exports: Backoff
// ============================================================================

pub use backoff::apply_jitter_ms;
pub use backoff::compute_backoff_delay;
pub use backoff::compute_capped_delay_ms;

// ============================================================================
// Re-exports: Lease
// ============================================================================

pub use lease::compute_expires_at;
pub use lease::is_lease_expired;
pub use lease::lock_partition_key;
pub use lease::remaining_lease_secs;

// ============================================================================
// Re-exports: Classification
// ============================================================================

pub use classify::is_retryable_store_error;
