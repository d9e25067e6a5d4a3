use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep_until, Instant};

/// Enforce a minimum spacing between calls to an external service.
///
/// The lock is held while waiting, so that concurrent callers queue up and
/// at most one call happens per interval.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

/// Proof that the caller may call the service now. The end of the call is
/// recorded when the permit is dropped.
pub struct Permit<'a> {
    last: MutexGuard<'a, Option<Instant>>,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        *self.last = Some(Instant::now());
    }
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        RateLimiter {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Wait until a call is allowed. Other callers wait until the permit
    /// is dropped.
    pub async fn acquire(&self) -> Permit<'_> {
        let last = self.last.lock().await;
        if let Some(previous) = *last {
            sleep_until(previous + self.interval).await;
        }
        Permit { last }
    }
}
