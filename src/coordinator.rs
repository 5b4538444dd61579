//! Lease lock coordinator.
//!
//! Grants and revokes leases on named resources through two conditional
//! writes against a [`LockStore`]:
//!
//! - acquire: put `{ownerId, expiresAt}` if the item is absent or its
//!   `expiresAt` lies in the past
//! - release: delete the item if its `ownerId` matches
//!
//! The coordinator keeps no local lock state; ownership is decided entirely
//! by the store. A crashed owner's lease becomes eligible for takeover once
//! `expiresAt` has passed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::config::ConfigError;
use crate::config::LeaseLockConfig;
use crate::config::LockOptions;
use crate::config::RetryOptions;
use crate::error::LeaseLockError;
use crate::error::RetryError;
use crate::error::StoreError;
use crate::handle::LockHandle;
use crate::metrics::LockMetrics;
use crate::metrics::NoOpLockMetrics;
use crate::retry::RetryEngine;
use crate::store::ConditionalDeleteRequest;
use crate::store::ConditionalPutRequest;
use crate::store::DeleteCondition;
use crate::store::LockKey;
use crate::store::LockRecord;
use crate::store::LockStore;
use crate::store::PutCondition;
use crate::verified::compute_expires_at;
use crate::verified::is_retryable_store_error;

/// Future returned by a [`LeaseLockCoordinator::with_lock`] critical section.
pub type CriticalSection<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Outcome of one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LockAcquisitionResult {
    pub(crate) acquired: bool,
    /// Deadline written by the successful put in Unix seconds (0 if not acquired).
    pub(crate) expires_at: u64,
}

/// Coordinates leases on named resources.
///
/// Cheap to clone; clones share the store, metrics sink, and retry engine.
pub struct LeaseLockCoordinator<S: LockStore + ?Sized + 'static> {
    store: Arc<S>,
    options: LockOptions,
    retry: RetryEngine,
    metrics: Arc<dyn LockMetrics>,
}

impl<S: LockStore + ?Sized + 'static> Clone for LeaseLockCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            options: self.options.clone(),
            retry: self.retry.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: LockStore + ?Sized + 'static> std::fmt::Debug for LeaseLockCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLockCoordinator")
            .field("options", &self.options)
            .field("retry", self.retry.options())
            .finish_non_exhaustive()
    }
}

impl<S: LockStore + ?Sized + 'static> LeaseLockCoordinator<S> {
    /// Create a coordinator with retry disabled and no metrics.
    ///
    /// # Arguments
    /// * `store` - The backing conditional-write store
    /// * `options` - Key layout and lease duration
    pub fn new(store: Arc<S>, options: LockOptions) -> Self {
        let metrics = NoOpLockMetrics::shared();
        Self {
            store,
            options,
            retry: RetryEngine::new(RetryOptions::default(), metrics.clone()),
            metrics,
        }
    }

    /// Build a coordinator from validated configuration.
    pub fn from_config(store: Arc<S>, config: LeaseLockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(store, config.lock).with_retry(config.retry))
    }

    /// Use the given retry tuning for acquisition.
    ///
    /// Acquisition is retried only when `retry.enabled` is set.
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = RetryEngine::new(retry, self.metrics.clone());
        self
    }

    /// Report lifecycle events to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn LockMetrics>) -> Self {
        self.retry = RetryEngine::new(self.retry.options().clone(), metrics.clone());
        self.metrics = metrics;
        self
    }

    /// Key layout and lease duration.
    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Retry tuning for acquisition.
    pub fn retry_options(&self) -> &RetryOptions {
        self.retry.options()
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Try to acquire the lease on `resource_id` for `owner_id`.
    ///
    /// Returns `Ok(false)` when the lease is held by a live owner, or when
    /// every permitted attempt hit a transient store fault. Cancellation
    /// yields [`LeaseLockError::Cancelled`]; fatal store errors propagate.
    pub async fn acquire(
        &self,
        resource_id: &str,
        owner_id: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, LeaseLockError> {
        Ok(self.acquire_lease(resource_id, owner_id, cancel).await?.acquired)
    }

    /// Acquire the lease and return a handle owning its release.
    ///
    /// Returns `Ok(None)` wherever [`acquire`](Self::acquire) returns `Ok(false)`.
    pub async fn acquire_handle(
        &self,
        resource_id: &str,
        owner_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle<S>>, LeaseLockError> {
        let result = self.acquire_lease(resource_id, owner_id, cancel).await?;
        if !result.acquired {
            return Ok(None);
        }
        Ok(Some(LockHandle::new(
            self.clone(),
            resource_id.to_string(),
            owner_id.to_string(),
            result.expires_at,
        )))
    }

    /// Release the lease on `resource_id` if `owner_id` still holds it.
    ///
    /// Returns `Ok(false)` when the stored owner differs or no lease exists.
    /// Release is never retried.
    pub async fn release(
        &self,
        resource_id: &str,
        owner_id: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, LeaseLockError> {
        ensure_not_empty("resource_id", resource_id)?;
        ensure_not_empty("owner_id", owner_id)?;

        let request = ConditionalDeleteRequest {
            key: LockKey::for_resource(resource_id),
            condition: DeleteCondition::OwnerEquals {
                owner_id: owner_id.to_string(),
            },
        };

        let start = Instant::now();
        let outcome = self.store.conditional_delete(request, cancel).await;
        self.metrics.lock_release_timer(resource_id, elapsed_ms(start));

        match outcome {
            Ok(()) => {
                debug!(resource_id, owner_id, "lock released");
                self.metrics.lock_released(resource_id);
                Ok(true)
            }
            Err(StoreError::ConditionFailed { .. }) => {
                warn!(resource_id, owner_id, "lock release failed: not held by owner");
                self.metrics.lock_release_failed(resource_id, "not_owner");
                Ok(false)
            }
            Err(StoreError::Cancelled) => {
                self.metrics.lock_release_failed(resource_id, "cancelled");
                Err(LeaseLockError::Cancelled {
                    operation: format!("release lock '{resource_id}'"),
                })
            }
            Err(source) => {
                warn!(resource_id, owner_id, error = %source, "lock release failed");
                self.metrics.lock_release_failed(resource_id, source.kind());
                Err(LeaseLockError::Store { source })
            }
        }
    }

    /// Run `section` while holding the lease on `resource_id`.
    ///
    /// Returns `Ok(None)` without running the section when the lease could
    /// not be acquired. Otherwise the lease is released exactly once after
    /// the section completes, whatever its outcome; a panic inside the
    /// section falls back to the handle's drop release.
    ///
    /// When the section fails, its error is returned and a failing release is
    /// only logged. When the section succeeds, a release error is returned.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let total = coordinator
    ///     .with_lock("ledger", "worker-1", &cancel, |handle| {
    ///         Box::pin(async move {
    ///             reconcile(handle.resource_id()).await
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn with_lock<T, E, F>(
        &self,
        resource_id: &str,
        owner_id: &str,
        cancel: &CancellationToken,
        section: F,
    ) -> Result<Option<T>, E>
    where
        E: From<LeaseLockError>,
        F: for<'h> FnOnce(&'h LockHandle<S>) -> CriticalSection<'h, T, E>,
    {
        let Some(handle) = self.acquire_handle(resource_id, owner_id, cancel).await? else {
            return Ok(None);
        };

        let outcome = section(&handle).await;

        // The section may have observed `cancel`; the lease is still ours to free.
        let released = handle.release(&CancellationToken::new()).await;

        match (outcome, released) {
            (Ok(value), Ok(_)) => Ok(Some(value)),
            (Ok(_), Err(error)) => Err(error.into()),
            (Err(error), Ok(_)) => Err(error),
            (Err(error), Err(release_error)) => {
                warn!(
                    resource_id,
                    owner_id,
                    error = %release_error,
                    "lock release after failed section failed"
                );
                Err(error)
            }
        }
    }

    pub(crate) async fn acquire_lease(
        &self,
        resource_id: &str,
        owner_id: &str,
        cancel: &CancellationToken,
    ) -> Result<LockAcquisitionResult, LeaseLockError> {
        ensure_not_empty("resource_id", resource_id)?;
        ensure_not_empty("owner_id", owner_id)?;

        // Each attempt reads the clock so the takeover condition and the
        // written deadline are both relative to the put that reaches the store.
        let store = &self.store;
        let lease_duration_secs = self.options.lease_duration_secs;
        let attempt_put = move || {
            let now = unix_timestamp_secs();
            let expires_at = compute_expires_at(now, lease_duration_secs);
            let request = ConditionalPutRequest {
                key: LockKey::for_resource(resource_id),
                record: LockRecord {
                    owner_id: owner_id.to_string(),
                    expires_at,
                },
                condition: PutCondition::AbsentOrExpired { now_secs: now },
            };
            async move { store.conditional_put(request, cancel).await.map(|()| expires_at) }
        };

        let start = Instant::now();
        let outcome = if self.retry.options().enabled {
            self.retry.execute(attempt_put, is_retryable_store_error, cancel).await
        } else {
            attempt_put().await.map_err(|source| RetryError::Operation { source, attempts: 1 })
        };
        self.metrics.lock_acquire_timer(resource_id, elapsed_ms(start));

        let error = match outcome {
            Ok(expires_at) => {
                debug!(resource_id, owner_id, expires_at, "lock acquired");
                self.metrics.lock_acquired(resource_id);
                return Ok(LockAcquisitionResult {
                    acquired: true,
                    expires_at,
                });
            }
            Err(RetryError::Cancelled { attempt }) => {
                debug!(resource_id, owner_id, attempt, "lock acquisition cancelled");
                StoreError::Cancelled
            }
            Err(RetryError::Operation { source, .. }) => source,
        };

        self.metrics.lock_acquire_failed(resource_id, error.kind());
        match error {
            StoreError::Cancelled => Err(LeaseLockError::Cancelled {
                operation: format!("acquire lock '{resource_id}'"),
            }),
            error if is_retryable_store_error(&error) => {
                debug!(resource_id, owner_id, reason = error.kind(), "lock not acquired");
                Ok(LockAcquisitionResult {
                    acquired: false,
                    expires_at: 0,
                })
            }
            source => {
                warn!(resource_id, owner_id, error = %source, "lock acquisition failed");
                Err(LeaseLockError::Store { source })
            }
        }
    }
}

fn ensure_not_empty(name: &'static str, value: &str) -> Result<(), LeaseLockError> {
    if value.is_empty() {
        return Err(LeaseLockError::InvalidArgument {
            name,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn unix_timestamp_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis().min(u64::MAX as u128) as u64
}
