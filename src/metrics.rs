//! Lock lifecycle metrics sinks.
//!
//! The coordinator and retry engine report every lifecycle event through the
//! [`LockMetrics`] trait. All methods default to no-ops, so a sink only
//! overrides what it exports. Implementations:
//!
//! - [`NoOpLockMetrics`]: the default, discards everything
//! - [`TracingLockMetrics`]: emits structured log events
//! - [`RecordingLockMetrics`]: keeps events in memory for tests and diagnostics

use parking_lot::Mutex;
use std::sync::Arc;

/// Event sink for lock lifecycle metrics.
pub trait LockMetrics: Send + Sync {
    /// `lock_acquire`: a lease was granted.
    fn lock_acquired(&self, _resource_id: &str) {}

    /// `lock_acquire_failed`: acquisition ended without a lease.
    fn lock_acquire_failed(&self, _resource_id: &str, _reason: &str) {}

    /// `lock_release`: a lease was deleted by its owner.
    fn lock_released(&self, _resource_id: &str) {}

    /// `lock_release_failed`: release did not delete the lease.
    fn lock_release_failed(&self, _resource_id: &str, _reason: &str) {}

    /// `retry_attempt`: attempt number `attempt` (>= 2) is about to run.
    fn retry_attempt(&self, _attempt: u32) {}

    /// `retries_exhausted`: the retry loop gave up after `attempts` attempts.
    fn retries_exhausted(&self, _attempts: u32) {}

    /// `lock_acquire_timer`: wall-clock duration of one acquire call.
    fn lock_acquire_timer(&self, _resource_id: &str, _elapsed_ms: u64) {}

    /// `lock_release_timer`: wall-clock duration of one release call.
    fn lock_release_timer(&self, _resource_id: &str, _elapsed_ms: u64) {}
}

/// No-op metrics sink (does nothing)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLockMetrics;

impl NoOpLockMetrics {
    /// Shared no-op sink.
    pub fn shared() -> Arc<dyn LockMetrics> {
        Arc::new(Self)
    }
}

impl LockMetrics for NoOpLockMetrics {}

/// Logging metrics sink
///
/// Publishes every event as a `tracing` event under the `lease_lock::metrics`
/// target, for correlation with application logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLockMetrics;

impl LockMetrics for TracingLockMetrics {
    fn lock_acquired(&self, resource_id: &str) {
        tracing::info!(target: "lease_lock::metrics", resource_id, "lock_acquire");
    }

    fn lock_acquire_failed(&self, resource_id: &str, reason: &str) {
        tracing::info!(target: "lease_lock::metrics", resource_id, reason, "lock_acquire_failed");
    }

    fn lock_released(&self, resource_id: &str) {
        tracing::info!(target: "lease_lock::metrics", resource_id, "lock_release");
    }

    fn lock_release_failed(&self, resource_id: &str, reason: &str) {
        tracing::info!(target: "lease_lock::metrics", resource_id, reason, "lock_release_failed");
    }

    fn retry_attempt(&self, attempt: u32) {
        tracing::info!(target: "lease_lock::metrics", attempt, "retry_attempt");
    }

    fn retries_exhausted(&self, attempts: u32) {
        tracing::info!(target: "lease_lock::metrics", attempts, "retries_exhausted");
    }

    fn lock_acquire_timer(&self, resource_id: &str, elapsed_ms: u64) {
        tracing::debug!(target: "lease_lock::metrics", resource_id, elapsed_ms, "lock_acquire_timer");
    }

    fn lock_release_timer(&self, resource_id: &str, elapsed_ms: u64) {
        tracing::debug!(target: "lease_lock::metrics", resource_id, elapsed_ms, "lock_release_timer");
    }
}

/// A single recorded metrics event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockMetricEvent {
    LockAcquired { resource_id: String },
    LockAcquireFailed { resource_id: String, reason: String },
    LockReleased { resource_id: String },
    LockReleaseFailed { resource_id: String, reason: String },
    RetryAttempt { attempt: u32 },
    RetriesExhausted { attempts: u32 },
    LockAcquireTimer { resource_id: String, elapsed_ms: u64 },
    LockReleaseTimer { resource_id: String, elapsed_ms: u64 },
}

/// In-memory metrics sink for testing and development
///
/// Stores all events in memory, in emission order.
#[derive(Debug, Clone, Default)]
pub struct RecordingLockMetrics {
    events: Arc<Mutex<Vec<LockMetricEvent>>>,
}

impl RecordingLockMetrics {
    /// Create a new recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded events (for testing)
    pub fn events(&self) -> Vec<LockMetricEvent> {
        self.events.lock().clone()
    }

    /// Count events matching a predicate.
    pub fn count(&self, predicate: impl Fn(&LockMetricEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }

    /// Number of `retry_attempt` events.
    pub fn retry_attempts(&self) -> usize {
        self.count(|event| matches!(event, LockMetricEvent::RetryAttempt { .. }))
    }

    /// Number of `retries_exhausted` events.
    pub fn retries_exhausted_count(&self) -> usize {
        self.count(|event| matches!(event, LockMetricEvent::RetriesExhausted { .. }))
    }

    /// Clear all events (for testing)
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: LockMetricEvent) {
        self.events.lock().push(event);
    }
}

impl LockMetrics for RecordingLockMetrics {
    fn lock_acquired(&self, resource_id: &str) {
        self.push(LockMetricEvent::LockAcquired {
            resource_id: resource_id.to_string(),
        });
    }

    fn lock_acquire_failed(&self, resource_id: &str, reason: &str) {
        self.push(LockMetricEvent::LockAcquireFailed {
            resource_id: resource_id.to_string(),
            reason: reason.to_string(),
        });
    }

    fn lock_released(&self, resource_id: &str) {
        self.push(LockMetricEvent::LockReleased {
            resource_id: resource_id.to_string(),
        });
    }

    fn lock_release_failed(&self, resource_id: &str, reason: &str) {
        self.push(LockMetricEvent::LockReleaseFailed {
            resource_id: resource_id.to_string(),
            reason: reason.to_string(),
        });
    }

    fn retry_attempt(&self, attempt: u32) {
        self.push(LockMetricEvent::RetryAttempt { attempt });
    }

    fn retries_exhausted(&self, attempts: u32) {
        self.push(LockMetricEvent::RetriesExhausted { attempts });
    }

    fn lock_acquire_timer(&self, resource_id: &str, elapsed_ms: u64) {
        self.push(LockMetricEvent::LockAcquireTimer {
            resource_id: resource_id.to_string(),
            elapsed_ms,
        });
    }

    fn lock_release_timer(&self, resource_id: &str, elapsed_ms: u64) {
        self.push(LockMetricEvent::LockReleaseTimer {
            resource_id: resource_id.to_string(),
            elapsed_ms,
        });
    }
}
