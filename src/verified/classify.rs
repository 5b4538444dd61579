//! Retry eligibility of store errors.

use crate::error::StoreError;

/// Whether a store error is worth another acquisition attempt.
///
/// Contention, throttling, transient internal faults and rate limiting are
/// retryable. Cancellation and every other failure are fatal.
///
/// | Variant           | Retryable |
/// |-------------------|-----------|
/// | `ConditionFailed` | yes       |
/// | `Throttled`       | yes       |
/// | `InternalFault`   | yes       |
/// | `RateLimited`     | yes       |
/// | `Cancelled`       | no        |
/// | `Other`           | no        |
#[inline]
pub fn is_retryable_store_error(error: &StoreError) -> bool {
    match error {
        StoreError::ConditionFailed { .. }
        | StoreError::Throttled { .. }
        | StoreError::InternalFault { .. }
        | StoreError::RateLimited { .. } => true,
        StoreError::Cancelled | StoreError::Other { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(is_retryable_store_error(&StoreError::ConditionFailed { key: "lock#a".into() }));
        assert!(is_retryable_store_error(&StoreError::Throttled { reason: "pte".into() }));
        assert!(is_retryable_store_error(&StoreError::InternalFault { reason: "500".into() }));
        assert!(is_retryable_store_error(&StoreError::RateLimited { reason: "rle".into() }));
    }

    #[test]
    fn test_fatal_errors_are_not_retryable() {
        assert!(!is_retryable_store_error(&StoreError::Cancelled));
        assert!(!is_retryable_store_error(&StoreError::Other {
            detail: "validation".into()
        }));
    }
}
