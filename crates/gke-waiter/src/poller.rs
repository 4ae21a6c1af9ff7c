use crate::operation::{Operation, OperationOutcome};

/// Strategy describing how a kind of long-running operation is checked.
pub trait OperationPoller<O> {
    /// Whether the operation reached a terminal state
    fn is_done(&self, operation: &O) -> bool;

    /// Fetch the latest status of the operation
    fn poll(&self, operation: &mut O);

    /// Outcome of a finished operation
    fn get_result(&self, operation: &O) -> OperationOutcome;
}

/// Poller for operations that target a Kubernetes cluster.
///
/// Polling delegates to the operation's own `update`, so the same poller
/// drives namespace deletion, CRD creation and rollout tracking.
#[derive(Debug, Default, Clone, Copy)]
pub struct KubernetesPoller;

impl<O: Operation> OperationPoller<O> for KubernetesPoller {
    fn is_done(&self, operation: &O) -> bool {
        operation.state().done
    }

    fn poll(&self, operation: &mut O) {
        operation.update();
    }

    fn get_result(&self, operation: &O) -> OperationOutcome {
        OperationOutcome::from(operation.state())
    }
}
