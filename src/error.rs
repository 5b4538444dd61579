//! Error types for the lease lock.

use std::fmt;

use snafu::Snafu;

/// Closed set of outcomes a backing store reports for a conditional write.
///
/// Store adapters translate their client-specific failures into one of these
/// variants; retry classification is a pure function over the variant (see
/// [`crate::verified::is_retryable_store_error`]).
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(module)]
pub enum StoreError {
    /// The server-evaluated condition did not hold.
    #[snafu(display("condition check failed for '{key}'"))]
    ConditionFailed {
        /// Partition key value of the item.
        key: String,
    },

    /// Provisioned throughput exceeded or request throttled.
    #[snafu(display("store throttled the request: {reason}"))]
    Throttled {
        /// Description from the store.
        reason: String,
    },

    /// Transient internal error inside the store service.
    #[snafu(display("store internal fault: {reason}"))]
    InternalFault {
        /// Description from the store.
        reason: String,
    },

    /// Account or table level request rate limit exceeded.
    #[snafu(display("store rate limit exceeded: {reason}"))]
    RateLimited {
        /// Description from the store.
        reason: String,
    },

    /// The call was aborted through its cancellation token.
    #[snafu(display("store call cancelled"))]
    Cancelled,

    /// Any other store failure.
    #[snafu(display("store error: {detail}"))]
    Other {
        /// Description of the failure.
        detail: String,
    },
}

impl StoreError {
    /// Short label used as the `reason` of failure metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::ConditionFailed { .. } => "condition_failed",
            StoreError::Throttled { .. } => "throttled",
            StoreError::InternalFault { .. } => "internal_fault",
            StoreError::RateLimited { .. } => "rate_limited",
            StoreError::Cancelled => "cancelled",
            StoreError::Other { .. } => "store_error",
        }
    }
}

/// Errors from lock coordination.
///
/// Contention is never an error: a held lock surfaces as `false` / `None`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LeaseLockError {
    /// A required argument was missing or empty. No I/O was attempted.
    #[snafu(display("invalid argument '{name}': {reason}"))]
    InvalidArgument {
        /// Name of the offending parameter.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The caller cancelled the operation.
    #[snafu(display("operation cancelled: {operation}"))]
    Cancelled {
        /// Description of the operation.
        operation: String,
    },

    /// Fatal store error, propagated unmodified.
    #[snafu(display("fatal store fault: {source}"))]
    Store {
        /// The underlying error.
        source: StoreError,
    },
}

impl LeaseLockError {
    /// Whether this error represents a caller-requested abort.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LeaseLockError::Cancelled { .. })
    }

    /// Label used as the `reason` of failure metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LeaseLockError::InvalidArgument { .. } => "invalid_argument",
            LeaseLockError::Cancelled { .. } => "cancelled",
            LeaseLockError::Store { source } => source.kind(),
        }
    }
}

impl From<StoreError> for LeaseLockError {
    fn from(source: StoreError) -> Self {
        LeaseLockError::Store { source }
    }
}

/// Terminal outcome of [`crate::RetryEngine::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Cancellation was observed before an attempt or during a backoff delay.
    ///
    /// Any error from the preceding attempt is discarded.
    Cancelled {
        /// The attempt that was about to run (or was being waited for).
        attempt: u32,
    },
    /// The last executed attempt failed and no further attempt was permitted.
    Operation {
        /// The error from the last attempt, unchanged.
        source: E,
        /// Number of attempts executed.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Returns the operation error, if the loop ended on one.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            RetryError::Operation { source, .. } => Some(source),
            RetryError::Cancelled { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Cancelled { attempt } => {
                write!(f, "cancelled before attempt {}", attempt)
            }
            RetryError::Operation { source, attempts } => {
                write!(f, "{} (after {} attempts)", source, attempts)
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Operation { source, .. } => Some(source),
            RetryError::Cancelled { .. } => None,
        }
    }
}
