use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use gke_kube::hub::{
    NAMESPACE_DELETION_TIMEOUT_MS, delete_namespace_for_reinstall_with_clock,
    wait_for_deployment_rollout_with_clock,
};
use gke_kube::{KubeError, KubectlOutcome, KubectlRunner, KubernetesClient};
use gke_waiter::{VirtualClock, WaitConfig};

/// Answers kubectl calls from a queue and keeps the argument lists
#[derive(Default)]
struct QueueRunner {
    replies: RefCell<VecDeque<KubectlOutcome>>,
    seen: RefCell<Vec<String>>,
}

impl QueueRunner {
    fn new(replies: impl IntoIterator<Item = KubectlOutcome>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            seen: RefCell::default(),
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.borrow().clone()
    }
}

impl KubectlRunner for QueueRunner {
    fn run(&self, args: &[&str], _stdin: Option<&str>) -> KubectlOutcome {
        self.seen.borrow_mut().push(args.join(" "));
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| KubectlOutcome::Ok(String::new()))
    }
}

fn not_found(what: &str) -> KubectlOutcome {
    KubectlOutcome::failure(format!("Error from server (NotFound): {what} not found"))
}

#[test]
fn namespace_deletion_finishes_on_third_poll() {
    let runner = QueueRunner::new([
        KubectlOutcome::Ok("gke-connect   Active   3d".to_string()),
        KubectlOutcome::Ok("namespace \"gke-connect\" deleted".to_string()),
        KubectlOutcome::Ok(String::new()),
        not_found("namespaces \"gke-connect\""),
    ]);
    let client = KubernetesClient::new(&runner).hide_progress(true);
    let mut clock = VirtualClock::new();

    delete_namespace_for_reinstall_with_clock(&client, "gke-connect", &mut clock)
        .expect("namespace deleted");

    assert_eq!(
        clock.sleeps(),
        &[Duration::from_millis(5000), Duration::from_millis(10000)]
    );
    assert_eq!(
        runner.seen(),
        [
            "get namespace gke-connect",
            "delete namespace gke-connect",
            "delete namespace gke-connect",
            "delete namespace gke-connect"
        ]
    );
}

#[test]
fn namespace_deletion_times_out() {
    let runner = QueueRunner::new([KubectlOutcome::Ok("gke-connect Active".to_string())]);
    let client = KubernetesClient::new(&runner).hide_progress(true);
    let mut clock = VirtualClock::new();

    let err = delete_namespace_for_reinstall_with_clock(&client, "gke-connect", &mut clock)
        .expect_err("should time out");

    assert!(matches!(err, KubeError::NamespaceDeleteTimeout { .. }));
    let max_wait = Duration::from_millis(NAMESPACE_DELETION_TIMEOUT_MS);
    assert!(clock.total_slept() >= max_wait);
    assert!(clock.total_slept() <= max_wait + Duration::from_millis(15_000));
}

#[test]
fn rollout_waits_for_new_image() {
    let image = "gcr.io/gkeconnect/agent:2";
    let mut replies = vec![KubectlOutcome::Ok("gcr.io/gkeconnect/agent:1".to_string())];
    replies.extend(
        [image, "4", "4", "2", "2", "2", "2"]
            .into_iter()
            .map(|v| KubectlOutcome::Ok(v.to_string())),
    );
    let runner = QueueRunner::new(replies);
    let client = KubernetesClient::new(&runner).hide_progress(true);
    let config = WaitConfig::from_millis("Waiting for rollout", 0, 60_000, 4_000, 1_000)
        .expect("config");

    wait_for_deployment_rollout_with_clock(
        &client,
        "gke-connect",
        "gke-connect-agent",
        image,
        &config,
        VirtualClock::new(),
    )
    .expect("rolled out");

    assert_eq!(runner.seen().len(), 8);
}
