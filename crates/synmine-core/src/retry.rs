//! Bounded retry with a fixed delay

use std::fmt::Display;
use std::time::Duration;

use indicatif::ProgressBar;

use crate::error::FetchError;
use crate::stream::StreamError;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StreamError {
    fn is_retryable(&self) -> bool {
        StreamError::is_retryable(self)
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        FetchError::is_retryable(self)
    }
}

/// How many times to try a transient operation and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `attempt_fn` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `attempt_fn` receives the 1-based attempt number. Returns the final `Err`
    /// on exhaustion or on the first non-retryable error.
    pub fn run<T, E: Retryable + Display>(
        &self,
        label: &str,
        pb: &ProgressBar,
        mut attempt_fn: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, E> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match attempt_fn(attempt) {
                Ok(v) => return Ok(v),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    pb.set_message(format!("retry {attempt}/{}...", max_attempts - 1));
                    log::warn!(
                        "{label}: attempt {attempt}/{max_attempts} failed: {e}, retrying in {:?}",
                        self.delay
                    );
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("{label}: failed after {attempt} attempt(s): {e}");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Flaky(bool);

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(retryable={})", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[test]
    fn default_is_three_attempts_five_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[test]
    fn succeeds_on_third_attempt() {
        let mut calls = 0;
        let result = fast().run("t", &ProgressBar::hidden(), |attempt| {
            calls += 1;
            if attempt < 3 { Err(Flaky(true)) } else { Ok(attempt) }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<(), Flaky> = fast().run("t", &ProgressBar::hidden(), |_| {
            calls += 1;
            Err(Flaky(true))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_error_not_retried() {
        let mut calls = 0;
        let result: Result<(), Flaky> = fast().run("t", &ProgressBar::hidden(), |_| {
            calls += 1;
            Err(Flaky(false))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut calls = 0;
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let _: Result<(), Flaky> = policy.run("t", &ProgressBar::hidden(), |_| {
            calls += 1;
            Err(Flaky(true))
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn delay_is_honored_between_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(30));
        let start = std::time::Instant::now();
        let _: Result<(), Flaky> = policy.run("t", &ProgressBar::hidden(), |_| Err(Flaky(true)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
