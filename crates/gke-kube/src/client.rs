use gke_waiter::{Clock, KubernetesPoller, SystemClock, Waiter};
use tracing::{debug, instrument};

use crate::error::KubeError;
use crate::hub::namespace_deletion_wait_config;
use crate::kubectl::{KubectlOutcome, KubectlRunner};
use crate::operations::MembershipCrdCreationOperation;

pub const MEMBERSHIP_CRD_NAME: &str = "memberships.hub.gke.io";

/// A client for the subset of the Kubernetes API needed to register clusters
#[derive(Debug)]
pub struct KubernetesClient<R> {
    runner: R,
    hide_progress: bool,
}

impl<R: KubectlRunner> KubernetesClient<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            hide_progress: false,
        }
    }

    /// Disable spinners while waiting on the cluster
    pub fn hide_progress(mut self, hide: bool) -> Self {
        self.hide_progress = hide;
        self
    }

    pub fn progress_hidden(&self) -> bool {
        self.hide_progress
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn run(&self, args: &[&str]) -> KubectlOutcome {
        self.runner.run(args, None)
    }

    #[instrument(skip(self))]
    pub fn namespace_uid(&self, namespace: &str) -> Result<String, KubeError> {
        self.run(&[
            "get",
            "namespace",
            namespace,
            "-o",
            "jsonpath='{.metadata.uid}'",
        ])
        .into_result()
        .map(|out| out.replace('\'', ""))
        .map_err(KubeError::NamespaceUid)
    }

    pub fn events(&self, namespace: &str) -> Result<String, KubeError> {
        let namespace_arg = format!("--namespace={namespace}");
        self.run(&[
            "get",
            "events",
            &namespace_arg,
            "--sort-by='{.lastTimestamp}'",
        ])
        .into_result()
        .map_err(KubeError::Events)
    }

    /// Namespaces matching `label`; only the first match is returned
    #[instrument(skip(self))]
    pub fn namespaces_with_label_selector(&self, label: &str) -> Result<Vec<String>, KubeError> {
        let items = self
            .run(&["get", "namespaces", "--selector", label, "-o", "jsonpath={.items}"])
            .into_result()
            .map_err(KubeError::ListNamespaces)?;
        if items == "[]" {
            return Ok(vec![]);
        }
        let out = self
            .run(&[
                "get",
                "namespaces",
                "--selector",
                label,
                "-o",
                "jsonpath={.items[0].metadata.name}",
            ])
            .into_result()
            .map_err(KubeError::ListNamespaces)?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    pub fn delete_membership(&self) -> KubectlOutcome {
        self.run(&["delete", "membership", "membership"])
    }

    pub fn membership_crd_exists(&self) -> Result<bool, KubeError> {
        match self.run(&["get", "crds", MEMBERSHIP_CRD_NAME]) {
            KubectlOutcome::Ok(_) => Ok(true),
            KubectlOutcome::NotFound(_) => Ok(false),
            KubectlOutcome::Failed(err) => Err(KubeError::MembershipCrdLookup(err)),
        }
    }

    /// YAML of the membership CR, empty when there is none
    pub fn membership_cr(&self) -> Result<String, KubeError> {
        match self.run(&["get", "membership", "membership", "-o", "yaml"]) {
            KubectlOutcome::Ok(out) => Ok(out),
            KubectlOutcome::NotFound(_) => Ok(String::new()),
            KubectlOutcome::Failed(err) => Err(KubeError::MembershipCr(err)),
        }
    }

    /// YAML of the membership CRD, empty when there is none
    pub fn membership_crd(&self) -> Result<String, KubeError> {
        match self.run(&[
            "get",
            "customresourcedefinition",
            MEMBERSHIP_CRD_NAME,
            "-o",
            "yaml",
        ]) {
            KubectlOutcome::Ok(out) => Ok(out),
            KubectlOutcome::NotFound(_) => Ok(String::new()),
            KubectlOutcome::Failed(err) => Err(KubeError::MembershipCrd(err)),
        }
    }

    /// Owner id recorded in the membership resource
    pub fn membership_owner_id(&self) -> Result<Option<String>, KubeError> {
        if !self.membership_crd_exists()? {
            return Ok(None);
        }
        match self.run(&[
            "get",
            "membership",
            "membership",
            "-o",
            "jsonpath={.spec.owner.id}",
        ]) {
            KubectlOutcome::Ok(out) => Ok(Some(out)),
            KubectlOutcome::NotFound(_) => Ok(None),
            KubectlOutcome::Failed(err) => Err(KubeError::MembershipOwner(err)),
        }
    }

    pub fn create_membership_crd(&self, manifest: &str) -> KubectlOutcome {
        self.apply(manifest)
    }

    /// Apply the membership CRD, waiting until the server has it, then the CR
    pub fn apply_membership(
        &self,
        crd_manifest: Option<&str>,
        cr_manifest: Option<&str>,
    ) -> Result<(), KubeError> {
        self.apply_membership_with_clock(crd_manifest, cr_manifest, SystemClock::start())
    }

    #[instrument(skip_all, fields(crd = crd_manifest.is_some(), cr = cr_manifest.is_some()))]
    pub fn apply_membership_with_clock<C: Clock>(
        &self,
        crd_manifest: Option<&str>,
        cr_manifest: Option<&str>,
        clock: C,
    ) -> Result<(), KubeError> {
        if let Some(manifest) = crd_manifest.filter(|m| !m.is_empty()) {
            let mut config = namespace_deletion_wait_config("Creating membership CRD")?;
            if self.hide_progress {
                config = config.without_progress();
            }
            let mut operation = MembershipCrdCreationOperation::new(self, manifest);
            let outcome = Waiter::with_clock(config, clock)
                .wait_for(&KubernetesPoller, &mut operation)?;
            if let Some(err) = outcome.error {
                return Err(KubeError::MembershipCrdCreation(err));
            }
        }
        if let Some(manifest) = cr_manifest.filter(|m| !m.is_empty()) {
            if let Some(err) = self.apply(manifest).error() {
                return Err(KubeError::ApplyMembershipCr(err.to_string()));
            }
        }
        Ok(())
    }

    pub fn namespace_exists(&self, namespace: &str) -> bool {
        self.run(&["get", "namespace", namespace]).is_ok()
    }

    pub fn delete_namespace(&self, namespace: &str) -> KubectlOutcome {
        self.run(&["delete", "namespace", namespace])
    }

    /// Value at `json_path` on `resource` (`<type>/<name>` or `<type>`).
    ///
    /// `namespace` is `None` for cluster-scoped resources. A missing field is
    /// an empty string.
    pub fn resource_field(
        &self,
        namespace: Option<&str>,
        resource: &str,
        json_path: &str,
    ) -> KubectlOutcome {
        let output = format!("jsonpath={{{json_path}}}");
        let mut args = vec![];
        if let Some(ns) = namespace {
            args.extend(["-n", ns]);
        }
        args.extend(["get", resource, "-o", output.as_str()]);
        debug!(?args, "reading resource field");
        self.run(&args)
    }

    pub fn apply(&self, manifest: &str) -> KubectlOutcome {
        self.runner.run(&["apply", "-f", "-"], Some(manifest))
    }

    pub fn delete(&self, manifest: &str) -> KubectlOutcome {
        self.runner.run(&["delete", "-f", "-"], Some(manifest))
    }

    /// Logs of any target `kubectl logs` accepts
    pub fn logs(&self, namespace: &str, target: &str) -> KubectlOutcome {
        self.run(&["logs", "-n", namespace, target])
    }
}

#[cfg(test)]
mod tests {
    use gke_waiter::VirtualClock;

    use super::*;
    use crate::kubectl::fake::ScriptedRunner;

    #[test]
    fn test_namespace_uid_strips_quotes() {
        let client = KubernetesClient::new(ScriptedRunner::new([ScriptedRunner::ok(
            "'4c2a1f0e-aaaa-bbbb-cccc-000000000001'",
        )]));
        assert_eq!(
            client.namespace_uid("kube-system").expect("uid"),
            "4c2a1f0e-aaaa-bbbb-cccc-000000000001"
        );
        let calls = client.runner().calls();
        assert_eq!(
            calls[0].args,
            ["get", "namespace", "kube-system", "-o", "jsonpath='{.metadata.uid}'"]
        );
    }

    #[test]
    fn test_namespace_uid_error() {
        let client = KubernetesClient::new(ScriptedRunner::new([ScriptedRunner::failed(
            "connection refused",
        )]));
        let err = client.namespace_uid("kube-system").expect_err("error");
        assert_eq!(
            err.to_string(),
            "Failed to get the UID of the cluster: connection refused"
        );
    }

    #[test]
    fn test_namespaces_with_label_selector() {
        let client = KubernetesClient::new(ScriptedRunner::new([ScriptedRunner::ok("[]")]));
        assert!(
            client
                .namespaces_with_label_selector("hub.gke.io/project")
                .expect("list")
                .is_empty()
        );
        assert_eq!(client.runner().calls().len(), 1);

        let client = KubernetesClient::new(ScriptedRunner::new([
            ScriptedRunner::ok("[{...}]"),
            ScriptedRunner::ok("gke-connect"),
        ]));
        assert_eq!(
            client
                .namespaces_with_label_selector("hub.gke.io/project")
                .expect("list"),
            ["gke-connect"]
        );
    }

    #[test]
    fn test_membership_crd_exists() {
        let client = KubernetesClient::new(ScriptedRunner::new([
            ScriptedRunner::ok("memberships.hub.gke.io"),
            ScriptedRunner::not_found(),
            ScriptedRunner::failed("forbidden"),
        ]));
        assert!(client.membership_crd_exists().expect("exists"));
        assert!(!client.membership_crd_exists().expect("absent"));
        assert!(matches!(
            client.membership_crd_exists(),
            Err(KubeError::MembershipCrdLookup(_))
        ));
    }

    #[test]
    fn test_membership_owner_id_without_crd() {
        let client = KubernetesClient::new(ScriptedRunner::new([ScriptedRunner::not_found()]));
        assert_eq!(client.membership_owner_id().expect("owner"), None);
        assert_eq!(client.runner().remaining(), 0);
    }

    #[test]
    fn test_membership_cr_not_found_is_empty() {
        let client = KubernetesClient::new(ScriptedRunner::new([ScriptedRunner::not_found()]));
        assert_eq!(client.membership_cr().expect("cr"), "");
    }

    #[test]
    fn test_resource_field_args() {
        let client = KubernetesClient::new(ScriptedRunner::new([
            ScriptedRunner::ok("3"),
            ScriptedRunner::ok("v1"),
        ]));
        client.resource_field(Some("gke-connect"), "deployment/agent", ".spec.replicas");
        client.resource_field(None, "crd/memberships.hub.gke.io", ".spec.version");

        let calls = client.runner().calls();
        assert_eq!(
            calls[0].args,
            ["-n", "gke-connect", "get", "deployment/agent", "-o", "jsonpath={.spec.replicas}"]
        );
        assert_eq!(
            calls[1].args,
            ["get", "crd/memberships.hub.gke.io", "-o", "jsonpath={.spec.version}"]
        );
    }

    #[test]
    fn test_apply_pipes_manifest() {
        let client = KubernetesClient::new(ScriptedRunner::new([ScriptedRunner::ok("created")]));
        assert!(client.apply("kind: Namespace").is_ok());
        let call = &client.runner().calls()[0];
        assert_eq!(call.args, ["apply", "-f", "-"]);
        assert_eq!(call.stdin.as_deref(), Some("kind: Namespace"));
    }

    #[test]
    fn test_apply_membership_waits_for_unchanged() {
        let client = KubernetesClient::new(ScriptedRunner::new([
            ScriptedRunner::ok("customresourcedefinition.apiextensions.k8s.io/memberships.hub.gke.io created"),
            ScriptedRunner::ok("customresourcedefinition.apiextensions.k8s.io/memberships.hub.gke.io unchanged"),
            ScriptedRunner::ok("membership.hub.gke.io/membership created"),
        ]))
        .hide_progress(true);

        client
            .apply_membership_with_clock(Some("crd"), Some("cr"), VirtualClock::new())
            .expect("apply");

        let calls = client.runner().calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].stdin.as_deref(), Some("cr"));
    }

    #[test]
    fn test_apply_membership_crd_failure() {
        let client = KubernetesClient::new(ScriptedRunner::new([ScriptedRunner::failed(
            "error validating data",
        )]))
        .hide_progress(true);

        let err = client
            .apply_membership_with_clock(Some("crd"), Some("cr"), VirtualClock::new())
            .expect_err("should fail");
        assert_eq!(
            err.to_string(),
            "Membership CRD creation failed to complete: error validating data"
        );
        assert_eq!(client.runner().calls().len(), 1);
    }

    #[test]
    fn test_apply_membership_cr_failure() {
        let client = KubernetesClient::new(ScriptedRunner::new([ScriptedRunner::failed(
            "admission webhook denied",
        )]))
        .hide_progress(true);

        let err = client
            .apply_membership(None, Some("cr"))
            .expect_err("should fail");
        assert!(matches!(err, KubeError::ApplyMembershipCr(_)));
    }
}
