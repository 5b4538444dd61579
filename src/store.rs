//! Backing store interface for lock items.
//!
//! The store is an external atomic key-value service. The coordinator never
//! caches lock state: every operation is one conditional write evaluated by
//! the store against the current item.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::constants::LOCK_SORT_KEY;
use crate::error::StoreError;
use crate::verified::is_lease_expired;
use crate::verified::lock_partition_key;

/// Composite key of a lock item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey {
    /// Partition key value: `lock#{resource_id}`.
    pub partition: String,
    /// Sort key value: always `metadata#lock`.
    pub sort: String,
}

impl LockKey {
    /// Key of the lock item guarding `resource_id`.
    pub fn for_resource(resource_id: &str) -> Self {
        Self {
            partition: lock_partition_key(resource_id),
            sort: LOCK_SORT_KEY.to_string(),
        }
    }
}

/// Attributes of a lock item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Current lease holder.
    pub owner_id: String,
    /// Lease deadline in Unix seconds.
    pub expires_at: u64,
}

/// Condition evaluated by the store before a put.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PutCondition {
    /// No item exists, or the stored `expiresAt` is strictly before `now_secs`.
    ///
    /// Covers both first acquisition and takeover of a stale lease.
    AbsentOrExpired { now_secs: u64 },
}

impl PutCondition {
    /// Evaluate the condition against the current item.
    pub fn is_satisfied_by(&self, current: Option<&LockRecord>) -> bool {
        match self {
            PutCondition::AbsentOrExpired { now_secs } => match current {
                None => true,
                Some(record) => is_lease_expired(record.expires_at, *now_secs),
            },
        }
    }
}

/// Condition evaluated by the store before a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteCondition {
    /// The stored `ownerId` equals `owner_id`.
    OwnerEquals { owner_id: String },
}

impl DeleteCondition {
    /// Evaluate the condition against the current item.
    ///
    /// A missing item never satisfies an ownership check.
    pub fn is_satisfied_by(&self, current: Option<&LockRecord>) -> bool {
        match self {
            DeleteCondition::OwnerEquals { owner_id } => {
                matches!(current, Some(record) if &record.owner_id == owner_id)
            }
        }
    }
}

/// Request to write a lock item if its condition holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalPutRequest {
    pub key: LockKey,
    pub record: LockRecord,
    pub condition: PutCondition,
}

/// Request to delete a lock item if its condition holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalDeleteRequest {
    pub key: LockKey,
    pub condition: DeleteCondition,
}

/// Atomic conditional-write store holding lock items.
///
/// Implementations must evaluate each condition and apply the mutation as one
/// atomic step, so that exactly one of several racing puts wins. A failed
/// condition is reported as [`StoreError::ConditionFailed`]; a call aborted
/// through `cancel` as [`StoreError::Cancelled`].
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Write the item if the put condition holds.
    async fn conditional_put(
        &self,
        request: ConditionalPutRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    /// Delete the item if the delete condition holds.
    async fn conditional_delete(
        &self,
        request: ConditionalDeleteRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: LockStore + ?Sized> LockStore for std::sync::Arc<T> {
    async fn conditional_put(
        &self,
        request: ConditionalPutRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        (**self).conditional_put(request, cancel).await
    }

    async fn conditional_delete(
        &self,
        request: ConditionalDeleteRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        (**self).conditional_delete(request, cancel).await
    }
}
