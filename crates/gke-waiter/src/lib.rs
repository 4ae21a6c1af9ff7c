//! Polling of long-running operations.
//!
//! An [`Operation`] is advanced by an [`OperationPoller`] until it reports
//! done, sleeping between polls with a doubling interval capped at a ceiling.
//!
//! ```no_run
//! use gke_waiter::{wait_for, KubernetesPoller, WaitConfig};
//! # fn run<O: gke_waiter::Operation>(mut op: O) -> Result<(), gke_waiter::WaitError> {
//! let config = WaitConfig::from_millis("Deleting namespace", 0, 120_000, 15_000, 5_000)?;
//! let outcome = wait_for(&KubernetesPoller, &mut op, &config)?;
//! assert!(outcome.succeeded);
//! # Ok(())
//! # }
//! ```

mod backoff;
mod clock;
mod error;
mod operation;
mod poller;
mod progress;
mod retry;
mod wait;

pub use backoff::Backoff;
pub use clock::{Clock, SystemClock, VirtualClock};
pub use error::WaitError;
pub use operation::{Operation, OperationOutcome, OperationState};
pub use poller::{KubernetesPoller, OperationPoller};
pub use progress::{ProgressBarFactory, ProgressRenderer};
pub use retry::{HttpStatus, RetryPolicy, TOO_MANY_REQUESTS, retry_on_status};
pub use wait::{
    DEFAULT_MAX_WAIT, DEFAULT_PRE_START_SLEEP, DEFAULT_SLEEP, DEFAULT_WAIT_CEILING, WaitConfig,
    WaitConfigBuilder, WaitConfigBuilderError, WaitState, Waiter, wait_for,
};
