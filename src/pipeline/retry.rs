//! Bounded retry controller.
//!
//! Only transient failures are retried. `NotFound` and client errors are
//! final on the first attempt.

use std::future::Future;

use crate::models::MAX_ATTEMPTS;
use crate::services::FetchError;

/// Attempt bound for one kind of unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u8,
}

/// Result of running a unit under a policy.
#[derive(Debug)]
pub struct Attempt<T> {
    pub result: Result<T, FetchError>,
    /// Number of attempts made (1 or 2)
    pub attempts: u8,
}

impl RetryPolicy {
    /// Clamp `max_attempts` to `1..=MAX_ATTEMPTS`.
    pub fn new(max_attempts: u8) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1)
    }

    pub fn max_attempts(&self) -> u8 {
        self.max_attempts
    }

    /// Run `op` until it succeeds, fails terminally, or the bound is hit.
    ///
    /// Each attempt calls `op` afresh, so a paged unit restarts from its
    /// first page.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Attempt<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op().await {
                Err(error) if error.is_transient() && attempts < self.max_attempts => {
                    log::debug!("attempt {attempts} failed ({error}), retrying");
                }
                result => return Attempt { result, attempts },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}
