//! In-memory implementation of [`LockStore`] for testing.
//!
//! Provides a deterministic, non-persistent store that evaluates put/delete
//! conditions atomically under a single mutex, mirroring the behavior of a
//! production conditional-write backend without network I/O.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::StoreError;
use crate::store::ConditionalDeleteRequest;
use crate::store::ConditionalPutRequest;
use crate::store::LockKey;
use crate::store::LockRecord;
use crate::store::LockStore;
use crate::verified::is_lease_expired;

#[derive(Default)]
struct StoreState {
    items: HashMap<LockKey, LockRecord>,
    put_faults: VecDeque<StoreError>,
    delete_faults: VecDeque<StoreError>,
}

/// In-memory deterministic implementation of [`LockStore`].
///
/// # Limitations
///
/// - No background expiry (call [`DeterministicLockStore::purge_expired`] to emulate it)
/// - No persistence across restarts
/// - Single process only
///
/// # Fault injection
///
/// Queued faults are returned, in order, by the next calls of the matching
/// operation before any condition is evaluated.
///
/// # Example
///
/// ```ignore
/// use aspen_lease_lock::{DeterministicLockStore, LeaseLockCoordinator, LockOptions};
///
/// let store = DeterministicLockStore::new();
/// let coordinator = LeaseLockCoordinator::new(store.clone(), LockOptions::default());
/// ```
#[derive(Clone, Default)]
pub struct DeterministicLockStore {
    state: Arc<Mutex<StoreState>>,
    put_calls: Arc<AtomicU32>,
    delete_calls: Arc<AtomicU32>,
}

impl DeterministicLockStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of `conditional_put` calls received so far.
    pub fn put_calls(&self) -> u32 {
        self.put_calls.load(Ordering::Acquire)
    }

    /// Number of `conditional_delete` calls received so far.
    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::Acquire)
    }

    /// Queue errors to be returned by upcoming puts.
    pub async fn inject_put_faults(&self, faults: impl IntoIterator<Item = StoreError>) {
        self.state.lock().await.put_faults.extend(faults);
    }

    /// Queue errors to be returned by upcoming deletes.
    pub async fn inject_delete_faults(&self, faults: impl IntoIterator<Item = StoreError>) {
        self.state.lock().await.delete_faults.extend(faults);
    }

    /// Write a lock item directly, bypassing conditions.
    pub async fn insert_record(&self, resource_id: &str, record: LockRecord) {
        self.state.lock().await.items.insert(LockKey::for_resource(resource_id), record);
    }

    /// Read the lock item of a resource.
    pub async fn get_record(&self, resource_id: &str) -> Option<LockRecord> {
        self.state.lock().await.items.get(&LockKey::for_resource(resource_id)).cloned()
    }

    /// Number of stored lock items.
    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    /// Whether no lock items are stored.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.items.is_empty()
    }

    /// Remove items whose lease expired before `now_secs`.
    ///
    /// Emulates store-native TTL cleanup. Returns the number of removed items.
    pub async fn purge_expired(&self, now_secs: u64) -> usize {
        let mut state = self.state.lock().await;
        let before = state.items.len();
        state.items.retain(|_, record| !is_lease_expired(record.expires_at, now_secs));
        before - state.items.len()
    }
}

#[async_trait]
impl LockStore for DeterministicLockStore {
    async fn conditional_put(
        &self,
        request: ConditionalPutRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::AcqRel);
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let mut state = self.state.lock().await;
        if let Some(fault) = state.put_faults.pop_front() {
            return Err(fault);
        }

        let current = state.items.get(&request.key);
        if !request.condition.is_satisfied_by(current) {
            trace!(key = %request.key.partition, "conditional put rejected");
            return Err(StoreError::ConditionFailed {
                key: request.key.partition,
            });
        }

        state.items.insert(request.key, request.record);
        Ok(())
    }

    async fn conditional_delete(
        &self,
        request: ConditionalDeleteRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::AcqRel);
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let mut state = self.state.lock().await;
        if let Some(fault) = state.delete_faults.pop_front() {
            return Err(fault);
        }

        let current = state.items.get(&request.key);
        if !request.condition.is_satisfied_by(current) {
            trace!(key = %request.key.partition, "conditional delete rejected");
            return Err(StoreError::ConditionFailed {
                key: request.key.partition,
            });
        }

        state.items.remove(&request.key);
        Ok(())
    }
}
