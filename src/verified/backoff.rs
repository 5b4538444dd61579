//! Pure backoff computation functions.
//!
//! Delay before attempt `n + 1`, after the n-th failure (`n >= 1`):
//!
//! ```text
//! raw    = base_delay * multiplier^(n - 1)
//! capped = min(raw, max_delay)
//! delay  = capped + sample * capped * jitter_factor   (jitter on)
//!        = capped                                     (jitter off)
//! ```
//!
//! # Tiger Style
//!
//! - Non-finite intermediate values collapse to the cap instead of panicking
//! - Jitter factor and sample are clamped to `[0, 1]`
//! - Randomness is injected as an explicit sample

use std::time::Duration;

use crate::config::RetryOptions;

/// Compute the capped exponential delay in milliseconds.
///
/// # Arguments
///
/// * `failed_attempts` - Number of failures so far (`n >= 1`; 0 is treated as 1)
/// * `base_delay_ms` - Delay after the first failure
/// * `max_delay_ms` - Upper bound of the result
/// * `multiplier` - Growth factor; values that are not finite or not above 1 disable growth
///
/// # Example
///
/// ```ignore
/// assert_eq!(compute_capped_delay_ms(1, 100, 5_000, 2.0), 100.0);
/// assert_eq!(compute_capped_delay_ms(3, 100, 5_000, 2.0), 400.0);
/// assert_eq!(compute_capped_delay_ms(10, 100, 5_000, 2.0), 5_000.0);
/// ```
#[inline]
pub fn compute_capped_delay_ms(failed_attempts: u32, base_delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> f64 {
    let exponent = failed_attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
    let growth = if multiplier.is_finite() && multiplier > 1.0 {
        multiplier.powi(exponent)
    } else {
        1.0
    };

    let raw = base_delay_ms as f64 * growth;
    let max = max_delay_ms as f64;
    if !raw.is_finite() || raw > max { max } else { raw }
}

/// Add jitter to a capped delay.
///
/// Returns a value in `[capped_ms, capped_ms * (1 + jitter_factor))` for a
/// sample in `[0, 1)`.
#[inline]
pub fn apply_jitter_ms(capped_ms: f64, jitter_factor: f64, sample: f64) -> f64 {
    let factor = if jitter_factor.is_finite() {
        jitter_factor.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let sample = if sample.is_finite() { sample.clamp(0.0, 1.0) } else { 0.0 };
    capped_ms + capped_ms * factor * sample
}

/// Compute the full backoff delay after `failed_attempts` failures.
///
/// `jitter_sample` is ignored when jitter is disabled.
pub fn compute_backoff_delay(failed_attempts: u32, options: &RetryOptions, jitter_sample: f64) -> Duration {
    let capped = compute_capped_delay_ms(
        failed_attempts,
        options.base_delay_ms,
        options.max_delay_ms,
        options.backoff_multiplier,
    );
    let delay_ms = if options.use_jitter {
        apply_jitter_ms(capped, options.jitter_factor, jitter_sample)
    } else {
        capped
    };
    millis_to_duration(delay_ms)
}

/// Float-to-int casts saturate, so out-of-range values cannot panic here.
#[inline]
fn millis_to_duration(delay_ms: f64) -> Duration {
    Duration::from_nanos((delay_ms * 1_000_000.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryOptions {
        RetryOptions {
            use_jitter: false,
            ..RetryOptions::enabled()
        }
    }

    #[test]
    fn test_capped_delay_doubles() {
        assert_eq!(compute_capped_delay_ms(1, 100, 5_000, 2.0), 100.0);
        assert_eq!(compute_capped_delay_ms(2, 100, 5_000, 2.0), 200.0);
        assert_eq!(compute_capped_delay_ms(3, 100, 5_000, 2.0), 400.0);
        assert_eq!(compute_capped_delay_ms(6, 100, 5_000, 2.0), 3_200.0);
    }

    #[test]
    fn test_capped_delay_hits_max() {
        assert_eq!(compute_capped_delay_ms(7, 100, 5_000, 2.0), 5_000.0);
        assert_eq!(compute_capped_delay_ms(30, 100, 5_000, 2.0), 5_000.0);
    }

    #[test]
    fn test_capped_delay_zero_attempts_treated_as_first() {
        assert_eq!(compute_capped_delay_ms(0, 100, 5_000, 2.0), 100.0);
    }

    #[test]
    fn test_capped_delay_overflow_safety() {
        // 2^(u32::MAX) is infinite; must collapse to the cap
        assert_eq!(compute_capped_delay_ms(u32::MAX, 100, 5_000, 2.0), 5_000.0);
        assert_eq!(compute_capped_delay_ms(u32::MAX, u64::MAX, u64::MAX, 10.0), u64::MAX as f64);
    }

    #[test]
    fn test_capped_delay_degenerate_multiplier() {
        assert_eq!(compute_capped_delay_ms(5, 100, 5_000, 1.0), 100.0);
        assert_eq!(compute_capped_delay_ms(5, 100, 5_000, 0.5), 100.0);
        assert_eq!(compute_capped_delay_ms(5, 100, 5_000, f64::NAN), 100.0);
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(apply_jitter_ms(100.0, 0.25, 0.0), 100.0);
        assert_eq!(apply_jitter_ms(100.0, 0.25, 0.5), 112.5);
        assert!(apply_jitter_ms(100.0, 0.25, 0.999_999) < 125.0);
    }

    #[test]
    fn test_jitter_clamps_inputs() {
        assert_eq!(apply_jitter_ms(100.0, 4.0, 0.5), 150.0);
        assert_eq!(apply_jitter_ms(100.0, -1.0, 0.5), 100.0);
        assert_eq!(apply_jitter_ms(100.0, 0.25, f64::NAN), 100.0);
    }

    #[test]
    fn test_backoff_delay_without_jitter() {
        let options = no_jitter();
        assert_eq!(compute_backoff_delay(1, &options, 0.9), Duration::from_millis(100));
        assert_eq!(compute_backoff_delay(2, &options, 0.9), Duration::from_millis(200));
        assert_eq!(compute_backoff_delay(3, &options, 0.9), Duration::from_millis(400));
        assert_eq!(compute_backoff_delay(20, &options, 0.9), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_delay_with_jitter_windows() {
        let options = RetryOptions::enabled();
        for (failures, low, high) in [(1, 100, 125), (2, 200, 250), (3, 400, 500)] {
            for sample in [0.0, 0.3, 0.75, 0.999] {
                let delay = compute_backoff_delay(failures, &options, sample);
                assert!(delay >= Duration::from_millis(low), "{delay:?} below {low}ms");
                assert!(delay < Duration::from_millis(high), "{delay:?} not below {high}ms");
            }
        }
    }
}
