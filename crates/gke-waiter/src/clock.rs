use std::thread;
use std::time::{Duration, Instant};

/// Source of monotonic time and blocking sleeps for the wait loop.
pub trait Clock {
    /// Monotonic time since an arbitrary fixed origin
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`
    fn sleep(&mut self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &mut C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Wall clock backed by [`Instant`] and [`thread::sleep`]
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::start()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Clock whose time only moves when somebody sleeps on it.
///
/// Every sleep is recorded, which makes backoff schedules observable
/// without actually blocking.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now: Duration,
    sleeps: Vec<Duration>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without recording a sleep
    pub fn advance(&mut self, duration: Duration) {
        self.now = self.now.saturating_add(duration);
    }

    /// All sleeps requested so far, in order
    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }

    /// Sum of all requested sleeps
    pub fn total_slept(&self) -> Duration {
        self.sleeps.iter().sum()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        self.advance(duration);
    }
}
