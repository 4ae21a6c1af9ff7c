use std::time::Duration;

use tracing::{debug, instrument};

use crate::backoff::Backoff;
use crate::clock::Clock;

pub const TOO_MANY_REQUESTS: u16 = 429;

/// Errors that may carry an HTTP status code
pub trait HttpStatus {
    fn http_status(&self) -> Option<u16>;
}

/// How often and how patiently a call is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

/// Run `f`, retrying while it fails with exactly `status`.
///
/// Any other error, or running out of attempts, returns the last error.
#[instrument(skip(policy, clock, f))]
pub fn retry_on_status<T, E, C, F>(
    status: u16,
    policy: &RetryPolicy,
    clock: &mut C,
    mut f: F,
) -> Result<T, E>
where
    E: HttpStatus,
    C: Clock,
    F: FnMut() -> Result<T, E>,
{
    let mut backoff = Backoff::new(policy.initial_delay, policy.max_delay).ok();
    let mut attempt = 1;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if err.http_status() == Some(status) && attempt < policy.max_attempts => {
                let delay = backoff
                    .as_mut()
                    .map_or(policy.initial_delay, Backoff::next_delay);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                clock.sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
