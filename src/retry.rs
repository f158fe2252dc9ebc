//! Error classification and retry math.

use crate::config::RetryConfig;
use std::time::Duration;

/// How a generation failure should be routed. Grounded on the job queue's
/// `ErrorKind` distinction between retryable and terminal failures, plus the
/// panic case this engine recovers explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// I/O or lock-contention wrapper: retried with backoff.
    Transient,
    /// Unwrapped domain failure (e.g. template deleted): dead-lettered
    /// without retry.
    Permanent,
    /// Recovered panic: dead-lettered without retry, never resurfaced as a
    /// retryable condition.
    Panic,
    /// Worker cooperative-cancellation observed mid-job.
    Cancelled,
}

impl ErrorClass {
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// `delay = min(max_delay, base_delay * 2^(retry_count-1))`, then full
/// jitter: `uniform(0, delay)`. `retry_count` is the count *after*
/// incrementing (i.e. this call computes the delay before the i-th retry).
pub fn backoff_delay(retry_count: i32, cfg: &RetryConfig) -> Duration {
    let exponent = (retry_count - 1).max(0) as u32;
    let base = cfg.base_delay.as_secs_f64();
    let unjittered = (base * 2f64.powi(exponent as i32)).min(cfg.max_delay.as_secs_f64());
    let jittered = fastrand::f64() * unjittered;
    Duration::from_secs_f64(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RetryConfig {
        RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }

    #[test]
    fn delay_never_exceeds_max_delay() {
        let cfg = cfg();
        for retry in 1..20 {
            let d = backoff_delay(retry, &cfg);
            assert!(d <= cfg.max_delay);
        }
    }

    #[test]
    fn delay_grows_with_retry_count_in_expectation() {
        let cfg = cfg();
        // Upper bound (pre-jitter) at retry 1 is base_delay; at retry 4 it's
        // base_delay * 8, still within max_delay here.
        let one = backoff_delay(1, &cfg);
        assert!(one <= Duration::from_secs(1));
        let four = backoff_delay(4, &cfg);
        assert!(four <= Duration::from_secs(8));
    }

    #[test]
    fn transient_is_the_only_retryable_class() {
        assert!(ErrorClass::Transient.should_retry());
        assert!(!ErrorClass::Permanent.should_retry());
        assert!(!ErrorClass::Panic.should_retry());
        assert!(!ErrorClass::Cancelled.should_retry());
    }
}
