use std::time::Duration;

use indicatif::style::TemplateError;

use crate::wait::WaitConfigBuilderError;

/// Errors raised by the wait loop itself.
///
/// A finished operation that failed is not an error here: its failure is
/// reported through [`OperationOutcome`](crate::OperationOutcome).
#[derive(thiserror::Error, Debug)]
pub enum WaitError {
    /// The operation did not report done before the deadline
    #[error("Operation {operation} could not complete within {}ms", max_wait.as_millis())]
    Timeout {
        operation: String,
        max_wait: Duration,
    },
    /// The wait parameters violate their constraints
    #[error("Invalid wait configuration: {0}")]
    InvalidConfig(String),
    #[error("Progress Error")]
    ProgressError(#[from] TemplateError),
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<WaitConfigBuilderError> for WaitError {
    fn from(err: WaitConfigBuilderError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
