//! Scoped lease handle.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::coordinator::LeaseLockCoordinator;
use crate::error::LeaseLockError;
use crate::store::LockStore;
use crate::verified::remaining_lease_secs;

/// A granted lease.
///
/// Owns exactly one release obligation. The lease is released by an explicit
/// [`release`](Self::release) call, or on drop as a best-effort fallback;
/// it expires via TTL if neither reaches the store.
///
/// `expires_at` is a snapshot taken at acquisition and is never refreshed.
pub struct LockHandle<S: LockStore + ?Sized + 'static> {
    coordinator: LeaseLockCoordinator<S>,
    resource_id: String,
    owner_id: String,
    /// Lease deadline in Unix seconds.
    expires_at: u64,
    acquired: AtomicBool,
}

impl<S: LockStore + ?Sized + 'static> LockHandle<S> {
    pub(crate) fn new(
        coordinator: LeaseLockCoordinator<S>,
        resource_id: String,
        owner_id: String,
        expires_at: u64,
    ) -> Self {
        Self {
            coordinator,
            resource_id,
            owner_id,
            expires_at,
            acquired: AtomicBool::new(true),
        }
    }

    /// Resource this lease guards.
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Owner the lease was granted to.
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Lease deadline in Unix seconds, as written at acquisition.
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Seconds until the lease deadline (0 once passed).
    pub fn remaining_lease_secs(&self) -> u64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        remaining_lease_secs(self.expires_at, now)
    }

    /// True until the first release attempt, successful or not.
    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    /// Release the lease.
    ///
    /// Only the first call contacts the store; later calls return
    /// `Ok(false)`. The handle counts as released even if the store call
    /// fails.
    pub async fn release(&self, cancel: &CancellationToken) -> Result<bool, LeaseLockError> {
        if !self.acquired.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        self.coordinator.release(&self.resource_id, &self.owner_id, cancel).await
    }
}

impl<S: LockStore + ?Sized + 'static> std::fmt::Debug for LockHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("resource_id", &self.resource_id)
            .field("owner_id", &self.owner_id)
            .field("expires_at", &self.expires_at)
            .field("acquired", &self.is_acquired())
            .finish()
    }
}

impl<S: LockStore + ?Sized + 'static> Drop for LockHandle<S> {
    fn drop(&mut self) {
        if !*self.acquired.get_mut() {
            return;
        }
        *self.acquired.get_mut() = false;

        // Best-effort release - lease will expire anyway via TTL
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                resource_id = %self.resource_id,
                owner_id = %self.owner_id,
                "lock handle dropped outside a runtime, lease will expire via TTL"
            );
            return;
        };

        let coordinator = self.coordinator.clone();
        let resource_id = std::mem::take(&mut self.resource_id);
        let owner_id = std::mem::take(&mut self.owner_id);

        runtime.spawn(async move {
            match coordinator.release(&resource_id, &owner_id, &CancellationToken::new()).await {
                Ok(true) => debug!(resource_id = %resource_id, "lock released on drop"),
                Ok(false) => debug!(resource_id = %resource_id, "lock already gone on drop"),
                Err(e) => {
                    debug!(resource_id = %resource_id, error = %e, "lock release on drop failed (will expire via TTL)")
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::LockOptions;
    use crate::error::StoreError;
    use crate::inmemory::DeterministicLockStore;

    async fn settle(store: &DeterministicLockStore, delete_calls: u32) {
        for _ in 0..32 {
            if store.delete_calls() >= delete_calls {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    fn coordinator(store: &Arc<DeterministicLockStore>) -> LeaseLockCoordinator<DeterministicLockStore> {
        LeaseLockCoordinator::new(store.clone(), LockOptions::default())
    }

    #[tokio::test]
    async fn test_release_twice_contacts_store_once() {
        let store = DeterministicLockStore::new();
        let cancel = CancellationToken::new();
        let handle = coordinator(&store).acquire_handle("orders", "worker-1", &cancel).await.unwrap().unwrap();

        assert!(handle.is_acquired());
        assert!(handle.release(&cancel).await.unwrap());
        assert!(!handle.is_acquired());
        assert!(!handle.release(&cancel).await.unwrap());

        assert_eq!(store.delete_calls(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_release_then_drop_contacts_store_once() {
        let store = DeterministicLockStore::new();
        let cancel = CancellationToken::new();
        let handle = coordinator(&store).acquire_handle("orders", "worker-1", &cancel).await.unwrap().unwrap();

        handle.release(&cancel).await.unwrap();
        drop(handle);
        settle(&store, 2).await;

        assert_eq!(store.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_lease() {
        let store = DeterministicLockStore::new();
        let cancel = CancellationToken::new();
        {
            let handle = coordinator(&store).acquire_handle("orders", "worker-1", &cancel).await.unwrap().unwrap();
            assert_eq!(handle.owner_id(), "worker-1");
        }
        settle(&store, 1).await;

        assert_eq!(store.delete_calls(), 1);
        assert!(store.get_record("orders").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_release_still_marks_released() {
        let store = DeterministicLockStore::new();
        let cancel = CancellationToken::new();
        let handle = coordinator(&store).acquire_handle("orders", "worker-1", &cancel).await.unwrap().unwrap();
        store.inject_delete_faults([StoreError::InternalFault { reason: "500".into() }]).await;

        assert!(handle.release(&cancel).await.is_err());
        assert!(!handle.is_acquired());
        assert!(!handle.release(&cancel).await.unwrap());
        assert_eq!(store.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_expires_at_snapshot() {
        let store = DeterministicLockStore::new();
        let cancel = CancellationToken::new();
        let handle = coordinator(&store).acquire_handle("orders", "worker-1", &cancel).await.unwrap().unwrap();

        assert_eq!(store.get_record("orders").await.unwrap().expires_at, handle.expires_at());
        assert!(handle.remaining_lease_secs() <= 30);
        handle.release(&cancel).await.unwrap();
    }
}
