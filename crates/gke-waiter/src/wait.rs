use std::fmt::Display;
use std::time::Duration;

use colored::Colorize;
use derive_builder::Builder;
use tracing::{debug, info, instrument, warn};

use crate::backoff::Backoff;
use crate::clock::{Clock, SystemClock};
use crate::error::WaitError;
use crate::operation::OperationOutcome;
use crate::poller::OperationPoller;
use crate::progress::ProgressBarFactory;

pub const DEFAULT_PRE_START_SLEEP: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(1_800_000);
pub const DEFAULT_WAIT_CEILING: Duration = Duration::from_millis(180_000);
pub const DEFAULT_SLEEP: Duration = Duration::from_millis(2000);

/// Timing parameters of a single wait
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct WaitConfig {
    /// Shown while the operation is being polled
    #[builder(setter(into), default = "String::new()")]
    message: String,

    /// Sleep before the first poll
    #[builder(default = "DEFAULT_PRE_START_SLEEP")]
    pre_start_sleep: Duration,

    /// Give up once this much time has passed since the first poll
    #[builder(default = "DEFAULT_MAX_WAIT")]
    max_wait: Duration,

    /// Upper bound of the interval between polls
    #[builder(default = "DEFAULT_WAIT_CEILING")]
    wait_ceiling: Duration,

    /// First interval between polls; doubled after every poll
    #[builder(default = "DEFAULT_SLEEP")]
    sleep: Duration,

    /// Used to hide spinner animation for progress updates
    #[builder(default = "false")]
    hide_progress: bool,
}

impl WaitConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let sleep = self.sleep.unwrap_or(DEFAULT_SLEEP);
        let wait_ceiling = self.wait_ceiling.unwrap_or(DEFAULT_WAIT_CEILING);
        if wait_ceiling < sleep {
            return Err(format!(
                "wait ceiling {}ms must not be below the poll interval {}ms",
                wait_ceiling.as_millis(),
                sleep.as_millis()
            ));
        }
        Ok(())
    }
}

impl WaitConfig {
    pub fn builder() -> WaitConfigBuilder {
        WaitConfigBuilder::default()
    }

    /// Build a config from millisecond values
    pub fn from_millis(
        message: impl Into<String>,
        pre_start_sleep_ms: u64,
        max_wait_ms: u64,
        wait_ceiling_ms: u64,
        sleep_ms: u64,
    ) -> Result<Self, WaitError> {
        Ok(Self::builder()
            .message(message)
            .pre_start_sleep(Duration::from_millis(pre_start_sleep_ms))
            .max_wait(Duration::from_millis(max_wait_ms))
            .wait_ceiling(Duration::from_millis(wait_ceiling_ms))
            .sleep(Duration::from_millis(sleep_ms))
            .build()?)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn pre_start_sleep(&self) -> Duration {
        self.pre_start_sleep
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn wait_ceiling(&self) -> Duration {
        self.wait_ceiling
    }

    pub fn sleep(&self) -> Duration {
        self.sleep
    }

    /// Same timing with a different message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Same timing without the spinner
    pub fn without_progress(mut self) -> Self {
        self.hide_progress = true;
        self
    }
}

/// Where a wait currently is.
///
/// `DoneSuccess`, `DoneFailure` and `TimedOut` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    NotStarted,
    Polling,
    DoneSuccess,
    DoneFailure,
    TimedOut,
}

impl WaitState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotStarted | Self::Polling)
    }
}

/// Drives an operation to completion with bounded exponential backoff
#[derive(Debug)]
pub struct Waiter<C = SystemClock> {
    config: WaitConfig,
    clock: C,
    state: WaitState,
}

impl Waiter<SystemClock> {
    pub fn new(config: WaitConfig) -> Self {
        Self::with_clock(config, SystemClock::start())
    }
}

impl<C: Clock> Waiter<C> {
    pub fn with_clock(config: WaitConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            state: WaitState::NotStarted,
        }
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Poll `operation` until `poller` reports it done or `max_wait` passes.
    ///
    /// Returns the outcome of the finished operation. Running out of time is
    /// [`WaitError::Timeout`], regardless of any error the operation recorded
    /// while it was still running.
    #[instrument(skip_all, fields(operation = %operation))]
    pub fn wait_for<O, P>(
        &mut self,
        poller: &P,
        operation: &mut O,
    ) -> Result<OperationOutcome, WaitError>
    where
        O: Display,
        P: OperationPoller<O>,
    {
        let pb = ProgressBarFactory::new(self.config.hide_progress).create()?;
        let message = self.config.message.clone();
        if !message.is_empty() {
            pb.set_message(format!("⏳ {}", message.as_str().bold()));
        }

        if !self.config.pre_start_sleep.is_zero() {
            debug!(
                pre_start_sleep_ms = self.config.pre_start_sleep.as_millis() as u64,
                "sleeping before first poll"
            );
            self.clock.sleep(self.config.pre_start_sleep);
        }

        let started = self.clock.now();
        let mut backoff = Backoff::new(self.config.sleep, self.config.wait_ceiling)?;
        let mut attempt = 0u32;
        self.state = WaitState::Polling;

        loop {
            attempt += 1;
            poller.poll(operation);

            if poller.is_done(operation) {
                let outcome = poller.get_result(operation);
                self.state = if outcome.succeeded {
                    WaitState::DoneSuccess
                } else {
                    WaitState::DoneFailure
                };
                info!(attempt, succeeded = outcome.succeeded, "operation finished");
                pb.finish_and_clear();
                return Ok(outcome);
            }

            let elapsed = self.clock.now().saturating_sub(started);
            if elapsed >= self.config.max_wait {
                self.state = WaitState::TimedOut;
                warn!(
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "operation did not finish in time"
                );
                pb.finish_and_clear();
                return Err(WaitError::Timeout {
                    operation: operation.to_string(),
                    max_wait: self.config.max_wait,
                });
            }

            let delay = backoff.next_delay();
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "operation not done, sleeping"
            );
            if !message.is_empty() {
                pb.set_message(format!(
                    "⏳ {} {} seconds elapsed",
                    message.as_str().bold(),
                    elapsed.as_secs()
                ));
            }
            self.clock.sleep(delay);
        }
    }

    /// Give back the clock, e.g. to inspect a virtual schedule
    pub fn into_clock(self) -> C {
        self.clock
    }
}

/// Wait for `operation` on the system clock.
pub fn wait_for<O, P>(
    poller: &P,
    operation: &mut O,
    config: &WaitConfig,
) -> Result<OperationOutcome, WaitError>
where
    O: Display,
    P: OperationPoller<O>,
{
    Waiter::new(config.clone()).wait_for(poller, operation)
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;
    use crate::clock::VirtualClock;
    use crate::operation::{Operation, OperationState};
    use crate::poller::KubernetesPoller;

    /// Finishes on the `finish_on`-th update
    struct CountingOperation {
        updates: u32,
        finish_on: Option<u32>,
        fail_with: Option<&'static str>,
        state: OperationState,
    }

    impl CountingOperation {
        fn finishing_on(finish_on: u32) -> Self {
            Self {
                updates: 0,
                finish_on: Some(finish_on),
                fail_with: None,
                state: OperationState::default(),
            }
        }

        fn never_finishing() -> Self {
            Self {
                updates: 0,
                finish_on: None,
                fail_with: None,
                state: OperationState::default(),
            }
        }
    }

    impl fmt::Display for CountingOperation {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "<counting operation>")
        }
    }

    impl Operation for CountingOperation {
        fn update(&mut self) {
            self.updates += 1;
            if Some(self.updates) == self.finish_on {
                match self.fail_with {
                    Some(err) => self.state.fail(err),
                    None => self.state.succeed(),
                }
            } else {
                self.state.record_error("still running");
            }
        }

        fn state(&self) -> &OperationState {
            &self.state
        }
    }

    fn config(pre: u64, max: u64, ceiling: u64, sleep: u64) -> WaitConfig {
        WaitConfig::from_millis("testing", pre, max, ceiling, sleep)
            .expect("valid config")
            .without_progress()
    }

    #[test]
    fn test_done_on_third_poll_sleeps_twice() {
        let mut waiter = Waiter::with_clock(config(0, 120_000, 15_000, 5_000), VirtualClock::new());
        let mut operation = CountingOperation::finishing_on(3);

        let outcome = waiter
            .wait_for(&KubernetesPoller, &mut operation)
            .expect("should finish");

        assert!(outcome.succeeded);
        assert_eq!(operation.updates, 3);
        assert_eq!(waiter.state(), WaitState::DoneSuccess);
        let clock = waiter.into_clock();
        assert_eq!(
            clock.sleeps(),
            &[Duration::from_millis(5_000), Duration::from_millis(10_000)]
        );
        assert!(clock.total_slept() <= Duration::from_millis(120_000));
    }

    #[test]
    fn test_pre_start_sleep_happens_first() {
        let mut waiter = Waiter::with_clock(config(700, 10_000, 400, 100), VirtualClock::new());
        let mut operation = CountingOperation::finishing_on(2);

        waiter
            .wait_for(&KubernetesPoller, &mut operation)
            .expect("should finish");

        assert_eq!(
            waiter.clock().sleeps(),
            &[Duration::from_millis(700), Duration::from_millis(100)]
        );
    }

    #[test]
    fn test_failed_operation_is_an_outcome() {
        let mut waiter = Waiter::with_clock(config(0, 10_000, 400, 100), VirtualClock::new());
        let mut operation = CountingOperation::finishing_on(1);
        operation.fail_with = Some("boom");

        let outcome = waiter
            .wait_for(&KubernetesPoller, &mut operation)
            .expect("finished, even though unsuccessfully");

        assert_eq!(outcome, OperationOutcome::failure("boom"));
        assert_eq!(waiter.state(), WaitState::DoneFailure);
        assert!(waiter.clock().sleeps().is_empty());
    }

    #[test]
    fn test_times_out_within_one_interval_of_max_wait() {
        for (max, ceiling, sleep) in [(120_000, 15_000, 5_000), (1_000, 300, 7), (50, 50, 50)] {
            let mut waiter =
                Waiter::with_clock(config(0, max, ceiling, sleep), VirtualClock::new());
            let mut operation = CountingOperation::never_finishing();

            let err = waiter
                .wait_for(&KubernetesPoller, &mut operation)
                .expect_err("should time out");

            assert!(err.is_timeout());
            assert_eq!(waiter.state(), WaitState::TimedOut);
            let clock = waiter.into_clock();
            let last = clock.sleeps().last().copied().unwrap_or_default();
            assert!(clock.total_slept() >= Duration::from_millis(max));
            assert!(clock.total_slept() <= Duration::from_millis(max) + last);
            assert!(clock.sleeps().windows(2).all(|pair| pair[0] <= pair[1]));
            assert!(clock.sleeps().iter().all(|d| *d <= Duration::from_millis(ceiling)));
        }
    }

    #[test]
    fn test_timeout_hides_operation_error() {
        let mut waiter = Waiter::with_clock(config(0, 100, 50, 50), VirtualClock::new());
        let mut operation = CountingOperation::never_finishing();

        let err = waiter
            .wait_for(&KubernetesPoller, &mut operation)
            .expect_err("should time out");

        let message = err.to_string();
        assert!(message.contains("could not complete"));
        assert!(!message.contains("still running"));
    }

    #[test]
    fn test_zero_max_wait_polls_once() {
        let mut waiter = Waiter::with_clock(config(0, 0, 10, 10), VirtualClock::new());
        let mut operation = CountingOperation::never_finishing();

        assert!(waiter.wait_for(&KubernetesPoller, &mut operation).is_err());
        assert_eq!(operation.updates, 1);
        assert!(waiter.clock().sleeps().is_empty());
    }

    #[test]
    fn test_ceiling_below_sleep_is_rejected() {
        let err = WaitConfig::from_millis("bad", 0, 1000, 10, 20).expect_err("invalid");
        assert!(matches!(err, WaitError::InvalidConfig(_)));
    }

    #[test]
    fn test_state_terminality() {
        assert!(!WaitState::NotStarted.is_terminal());
        assert!(!WaitState::Polling.is_terminal());
        assert!(WaitState::DoneSuccess.is_terminal());
        assert!(WaitState::DoneFailure.is_terminal());
        assert!(WaitState::TimedOut.is_terminal());
    }
}
