use std::fmt;

use gke_waiter::{Operation, OperationState};
use tracing::debug;

use crate::client::KubernetesClient;
use crate::kubectl::{KubectlOutcome, KubectlRunner};

/// Waits for a namespace to disappear by deleting it until it is gone
pub struct NamespaceDeleteOperation<'a, R> {
    namespace: String,
    client: &'a KubernetesClient<R>,
    state: OperationState,
}

impl<'a, R: KubectlRunner> NamespaceDeleteOperation<'a, R> {
    pub fn new(namespace: impl Into<String>, client: &'a KubernetesClient<R>) -> Self {
        Self {
            namespace: namespace.into(),
            client,
            state: OperationState::default(),
        }
    }
}

impl<R> fmt::Display for NamespaceDeleteOperation<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<deleting namespace {}>", self.namespace)
    }
}

impl<R: KubectlRunner> Operation for NamespaceDeleteOperation<'_, R> {
    fn update(&mut self) {
        match self.client.delete_namespace(&self.namespace) {
            // deletion accepted, namespace still terminating
            KubectlOutcome::Ok(_) => {}
            KubectlOutcome::NotFound(_) => self.state.succeed(),
            KubectlOutcome::Failed(err) => {
                debug!(namespace = %self.namespace, %err, "namespace delete failed, retrying");
                self.state.record_error(err);
            }
        }
    }

    fn state(&self) -> &OperationState {
        &self.state
    }
}

/// Applies the membership CRD until the server reports it `unchanged`
pub struct MembershipCrdCreationOperation<'a, R> {
    client: &'a KubernetesClient<R>,
    manifest: String,
    state: OperationState,
}

impl<'a, R: KubectlRunner> MembershipCrdCreationOperation<'a, R> {
    pub const CREATED_KEYWORD: &'static str = "unchanged";

    pub fn new(client: &'a KubernetesClient<R>, manifest: impl Into<String>) -> Self {
        Self {
            client,
            manifest: manifest.into(),
            state: OperationState::default(),
        }
    }
}

impl<R> fmt::Display for MembershipCrdCreationOperation<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<creating membership CRD>")
    }
}

impl<R: KubectlRunner> Operation for MembershipCrdCreationOperation<'_, R> {
    fn update(&mut self) {
        match self.client.create_membership_crd(&self.manifest) {
            KubectlOutcome::Ok(out) if out.contains(Self::CREATED_KEYWORD) => self.state.succeed(),
            KubectlOutcome::Ok(_) => {}
            KubectlOutcome::NotFound(err) | KubectlOutcome::Failed(err) => self.state.fail(err),
        }
    }

    fn state(&self) -> &OperationState {
        &self.state
    }
}

/// Tracks whether every pod of a deployment rollout is available.
///
/// Only a rollout of `image` counts, and only once the controller observed the
/// deployment's current generation, so the steady state from before the
/// rollout is never mistaken for its completion.
pub struct DeploymentPodsAvailableOperation<'a, R> {
    namespace: String,
    deployment: String,
    image: String,
    client: &'a KubernetesClient<R>,
    state: OperationState,
}

/// Why a poll stopped early
enum Pending {
    /// keep waiting
    NotYet,
    /// done with error
    Failed(String),
}

impl<'a, R: KubectlRunner> DeploymentPodsAvailableOperation<'a, R> {
    pub fn new(
        namespace: impl Into<String>,
        deployment: impl Into<String>,
        image: impl Into<String>,
        client: &'a KubernetesClient<R>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            deployment: deployment.into(),
            image: image.into(),
            client,
            state: OperationState::default(),
        }
    }

    fn field(&self, json_path: &str) -> Result<String, Pending> {
        let resource = format!("deployment/{}", self.deployment);
        match self
            .client
            .resource_field(Some(&self.namespace), &resource, json_path)
        {
            KubectlOutcome::Ok(value) => Ok(value),
            // deployment not created yet
            KubectlOutcome::NotFound(_) => Err(Pending::NotYet),
            KubectlOutcome::Failed(err) => Err(Pending::Failed(err)),
        }
    }

    fn count(&self, json_path: &str) -> Result<i64, Pending> {
        let value = self.field(json_path)?;
        let value = value.trim();
        if value.is_empty() {
            return Ok(0);
        }
        value.parse().map_err(|_| {
            Pending::Failed(format!(
                "unexpected value {value:?} for {json_path} of deployment {}/{}",
                self.namespace, self.deployment
            ))
        })
    }

    fn check(&self) -> Result<(), Pending> {
        let image = self.field(".spec.template.spec.containers[0].image")?;
        if image != self.image {
            return Err(Pending::NotYet);
        }

        let generation = self.count(".metadata.generation")?;
        let observed = self.count(".status.observedGeneration")?;
        if observed < generation {
            return Err(Pending::NotYet);
        }

        let spec_replicas = self.count(".spec.replicas")?;
        let status_replicas = self.count(".status.replicas")?;
        let available_replicas = self.count(".status.availableReplicas")?;
        let updated_replicas = self.count(".status.updatedReplicas")?;
        debug!(
            spec_replicas,
            status_replicas, available_replicas, updated_replicas, "deployment status"
        );

        // same checks as `kubectl rollout status`
        if updated_replicas < spec_replicas
            || status_replicas > updated_replicas
            || available_replicas < updated_replicas
        {
            return Err(Pending::NotYet);
        }
        Ok(())
    }
}

impl<R> fmt::Display for DeploymentPodsAvailableOperation<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Pod availability for {}/{}>",
            self.namespace, self.deployment
        )
    }
}

impl<R: KubectlRunner> Operation for DeploymentPodsAvailableOperation<'_, R> {
    fn update(&mut self) {
        match self.check() {
            Ok(()) => self.state.succeed(),
            Err(Pending::NotYet) => {}
            Err(Pending::Failed(err)) => self.state.fail(err),
        }
    }

    fn state(&self) -> &OperationState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubectl::fake::ScriptedRunner;

    const IMAGE: &str = "gcr.io/gkeconnect/gkeconnect-gce:release";

    fn ok(out: &str) -> KubectlOutcome {
        ScriptedRunner::ok(out)
    }

    #[test]
    fn test_namespace_delete_lifecycle() {
        let client = KubernetesClient::new(ScriptedRunner::new([
            ok("namespace \"gke-connect\" deleted"),
            ScriptedRunner::failed("Unable to connect to the server"),
            ScriptedRunner::not_found(),
        ]));
        let mut op = NamespaceDeleteOperation::new("gke-connect", &client);

        op.update();
        assert!(!op.state().done);
        assert_eq!(op.state().error, None);

        op.update();
        assert!(!op.state().done);
        assert_eq!(
            op.state().error.as_deref(),
            Some("Unable to connect to the server")
        );

        op.update();
        assert!(op.state().done);
        assert!(op.state().succeeded);
        assert_eq!(op.to_string(), "<deleting namespace gke-connect>");
    }

    #[test]
    fn test_crd_creation() {
        let client = KubernetesClient::new(ScriptedRunner::new([
            ok("customresourcedefinition/memberships.hub.gke.io created"),
            ok("customresourcedefinition/memberships.hub.gke.io unchanged"),
        ]));
        let mut op = MembershipCrdCreationOperation::new(&client, "crd");

        op.update();
        assert!(!op.state().done);
        op.update();
        assert!(op.state().done && op.state().succeeded);
    }

    #[test]
    fn test_crd_creation_error_is_final() {
        let client = KubernetesClient::new(ScriptedRunner::new([ScriptedRunner::failed(
            "the server could not find the requested resource",
        )]));
        let mut op = MembershipCrdCreationOperation::new(&client, "crd");

        op.update();
        assert!(op.state().done);
        assert!(!op.state().succeeded);
    }

    fn rollout(values: &[&str]) -> ScriptedRunner {
        ScriptedRunner::new(values.iter().map(|v| ok(v)))
    }

    #[test]
    fn test_rollout_complete() {
        let client = KubernetesClient::new(rollout(&[IMAGE, "2", "2", "3", "3", "3", "3"]));
        let mut op = DeploymentPodsAvailableOperation::new("gke-connect", "agent", IMAGE, &client);

        op.update();
        assert!(op.state().done && op.state().succeeded);
        let calls = client.runner().calls();
        assert_eq!(calls.len(), 7);
        assert_eq!(
            calls[0].args,
            [
                "-n",
                "gke-connect",
                "get",
                "deployment/agent",
                "-o",
                "jsonpath={.spec.template.spec.containers[0].image}"
            ]
        );
    }

    #[test]
    fn test_rollout_old_image_keeps_waiting() {
        let client = KubernetesClient::new(rollout(&["gcr.io/old:1"]));
        let mut op = DeploymentPodsAvailableOperation::new("ns", "agent", IMAGE, &client);

        op.update();
        assert!(!op.state().done);
        assert_eq!(client.runner().calls().len(), 1);
    }

    #[test]
    fn test_rollout_unobserved_generation_keeps_waiting() {
        let client = KubernetesClient::new(rollout(&[IMAGE, "3", "2"]));
        let mut op = DeploymentPodsAvailableOperation::new("ns", "agent", IMAGE, &client);

        op.update();
        assert!(!op.state().done);
        assert_eq!(client.runner().remaining(), 0);
    }

    #[test]
    fn test_rollout_replica_conditions() {
        // spec, status, available, updated
        for (counts, done) in [
            (["3", "3", "3", "2"], false),
            (["3", "4", "3", "3"], false),
            (["3", "3", "2", "3"], false),
            (["0", "", "", ""], true),
            (["3", "3", "3", "3"], true),
        ] {
            let mut values = vec![IMAGE, "1", "1"];
            values.extend(counts);
            let client = KubernetesClient::new(rollout(&values));
            let mut op = DeploymentPodsAvailableOperation::new("ns", "agent", IMAGE, &client);
            op.update();
            assert_eq!(op.state().done, done, "counts {counts:?}");
        }
    }

    #[test]
    fn test_rollout_not_found_keeps_waiting() {
        let client = KubernetesClient::new(ScriptedRunner::new([ScriptedRunner::not_found()]));
        let mut op = DeploymentPodsAvailableOperation::new("ns", "agent", IMAGE, &client);

        op.update();
        assert!(!op.state().done);
        assert_eq!(op.state().error, None);
    }

    #[test]
    fn test_rollout_failure_and_garbage() {
        let client = KubernetesClient::new(ScriptedRunner::new([ScriptedRunner::failed(
            "forbidden",
        )]));
        let mut op = DeploymentPodsAvailableOperation::new("ns", "agent", IMAGE, &client);
        op.update();
        assert!(op.state().done && !op.state().succeeded);
        assert_eq!(op.state().error.as_deref(), Some("forbidden"));

        let client = KubernetesClient::new(rollout(&[IMAGE, "1", "1", "three"]));
        let mut op = DeploymentPodsAvailableOperation::new("ns", "agent", IMAGE, &client);
        op.update();
        assert!(op.state().done && !op.state().succeeded);
        assert!(op.state().error.as_deref().unwrap_or_default().contains("three"));
    }
}
