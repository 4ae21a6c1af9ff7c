use std::time::Duration;

use adaptive_backoff::prelude::{
    Backoff as _, BackoffBuilder, ExponentialBackoff, ExponentialBackoffBuilder,
};

use crate::error::WaitError;

const BACKOFF_FACTOR: f64 = 2.0;

/// Doubling delay sequence capped at a ceiling.
///
/// The first delay is the initial interval; every following delay is twice
/// the previous one, never exceeding `ceiling`. The sequence is therefore
/// non-decreasing. A zero interval, or one already at the ceiling, repeats.
pub struct Backoff {
    exponential: Option<ExponentialBackoff>,
    initial: Duration,
    current: Duration,
    ceiling: Duration,
    saturated: bool,
}

impl Backoff {
    pub fn new(initial: Duration, ceiling: Duration) -> Result<Self, WaitError> {
        let initial = initial.min(ceiling);
        let exponential = if initial.is_zero() || initial == ceiling {
            None
        } else {
            let backoff = ExponentialBackoffBuilder::default()
                .factor(BACKOFF_FACTOR)
                .min(initial)
                .max(ceiling)
                .build()
                .map_err(|err| WaitError::InvalidConfig(format!("invalid backoff: {err}")))?;
            Some(backoff)
        };
        Ok(Self {
            exponential,
            initial,
            current: initial,
            ceiling,
            saturated: false,
        })
    }

    /// Delay to use for the next sleep
    pub fn next_delay(&mut self) -> Duration {
        if !self.saturated {
            if let Some(exponential) = self.exponential.as_mut() {
                self.current = exponential.wait().min(self.ceiling);
                // capped; later delays stay at the ceiling
                self.saturated = self.current == self.ceiling;
            }
        }
        self.current
    }

    /// Start over from the initial interval
    pub fn reset(&mut self) {
        if let Some(exponential) = self.exponential.as_mut() {
            exponential.reset();
        }
        self.current = self.initial;
        self.saturated = false;
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_delay())
    }
}
