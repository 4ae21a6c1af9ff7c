use std::fmt::Display;

/// Completion status carried by every tracked operation.
///
/// An operation starts out `NotDone`. Each call to [`Operation::update`] may
/// move it to done, and once done the `succeeded` flag and the optional
/// `error` describe how it finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationState {
    pub done: bool,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl OperationState {
    /// Mark the operation finished successfully
    pub fn succeed(&mut self) {
        self.done = true;
        self.succeeded = true;
    }

    /// Mark the operation finished with an error
    pub fn fail(&mut self, error: impl Into<String>) {
        self.done = true;
        self.succeeded = false;
        self.error = Some(error.into());
    }

    /// Remember an error without finishing the operation
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }
}

/// A unit of asynchronous work that is advanced by polling.
///
/// Implementors own whatever handle they need (a kubectl client, a manifest)
/// and mutate their [`OperationState`] in place on every `update`.
pub trait Operation: Display {
    /// Refresh the state of this operation
    fn update(&mut self);

    /// The latest known state
    fn state(&self) -> &OperationState;
}

/// What the caller gets back once an operation reports done
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    pub succeeded: bool,
    pub error: Option<String>,
}

impl OperationOutcome {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

impl From<&OperationState> for OperationOutcome {
    fn from(state: &OperationState) -> Self {
        Self {
            succeeded: state.succeeded,
            error: state.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut state = OperationState::default();
        assert!(!state.done);

        state.record_error("transient");
        assert!(!state.done);
        assert_eq!(state.error.as_deref(), Some("transient"));

        state.fail("fatal");
        assert!(state.done);
        assert!(!state.succeeded);
        assert_eq!(state.error.as_deref(), Some("fatal"));
    }

    #[test]
    fn test_outcome_from_state() {
        let mut state = OperationState::default();
        state.succeed();
        assert_eq!(OperationOutcome::from(&state), OperationOutcome::success());
    }
}
