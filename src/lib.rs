//! Lease-based distributed lock over an atomic conditional-write store.
//!
//! Processes coordinate exclusive access to a named resource by writing a
//! lease item `{ownerId, expiresAt}` into a shared key-value store:
//!
//! - acquisition is a conditional put that succeeds only if no live lease exists
//! - release is a conditional delete that succeeds only for the current owner
//! - a crashed owner's lease becomes available once `expiresAt` has passed
//!
//! Contention is not an error: a held lock surfaces as `false` / `None`.
//! Acquisition may be retried with exponential backoff and jitter; every
//! operation takes a [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use aspen_lease_lock::{DeterministicLockStore, LeaseLockCoordinator, LockOptions, RetryOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = DeterministicLockStore::new();
//! let coordinator = LeaseLockCoordinator::new(store, LockOptions::default())
//!     .with_retry(RetryOptions::enabled());
//! let cancel = CancellationToken::new();
//!
//! if let Some(handle) = coordinator.acquire_handle("invoices", "worker-1", &cancel).await? {
//!     // ... exclusive work ...
//!     handle.release(&cancel).await?;
//! }
//! ```
//!
//! # Modules
//!
//! - [`coordinator`]: acquire/release protocol and the scoped `with_lock` helper
//! - [`handle`]: lease handle owning one release obligation
//! - [`retry`]: exponential backoff retry engine
//! - [`store`]: backing store trait and conditional request types
//! - [`verified`]: pure backoff, lease, and classification functions
//! - [`config`]: lock and retry options, TOML and environment loading
//! - [`metrics`]: lifecycle metrics sinks

pub mod config;
pub mod constants;
pub mod coordinator;
#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod error;
pub mod handle;
pub mod inmemory;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod verified;

pub use config::ConfigError;
pub use config::LeaseLockConfig;
pub use config::LockOptions;
pub use config::RetryOptions;
pub use coordinator::CriticalSection;
pub use coordinator::LeaseLockCoordinator;
#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbConnection;
#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbLockStore;
pub use error::LeaseLockError;
pub use error::RetryError;
pub use error::StoreError;
pub use handle::LockHandle;
pub use inmemory::DeterministicLockStore;
pub use metrics::LockMetricEvent;
pub use metrics::LockMetrics;
pub use metrics::NoOpLockMetrics;
pub use metrics::RecordingLockMetrics;
pub use metrics::TracingLockMetrics;
pub use retry::RetryEngine;
pub use store::ConditionalDeleteRequest;
pub use store::ConditionalPutRequest;
pub use store::DeleteCondition;
pub use store::LockKey;
pub use store::LockRecord;
pub use store::LockStore;
pub use store::PutCondition;
