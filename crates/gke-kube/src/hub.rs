use gke_waiter::{Clock, KubernetesPoller, SystemClock, WaitConfig, WaitError, Waiter};
use tracing::{info, instrument};

use crate::client::KubernetesClient;
use crate::error::KubeError;
use crate::kubectl::KubectlRunner;
use crate::operations::{DeploymentPodsAvailableOperation, NamespaceDeleteOperation};

pub const NAMESPACE_DELETION_INITIAL_WAIT_MS: u64 = 0;
pub const NAMESPACE_DELETION_TIMEOUT_MS: u64 = 1000 * 60 * 2;
pub const NAMESPACE_DELETION_MAX_POLL_INTERVAL_MS: u64 = 1000 * 15;
pub const NAMESPACE_DELETION_INITIAL_POLL_INTERVAL_MS: u64 = 1000 * 5;

const KUBE_SYSTEM: &str = "kube-system";

/// Wait timing used for namespace deletion and membership CRD creation
pub fn namespace_deletion_wait_config(message: impl Into<String>) -> Result<WaitConfig, WaitError> {
    WaitConfig::from_millis(
        message,
        NAMESPACE_DELETION_INITIAL_WAIT_MS,
        NAMESPACE_DELETION_TIMEOUT_MS,
        NAMESPACE_DELETION_MAX_POLL_INTERVAL_MS,
        NAMESPACE_DELETION_INITIAL_POLL_INTERVAL_MS,
    )
}

/// UID of the `kube-system` namespace, which identifies the cluster
pub fn cluster_uuid<R: KubectlRunner>(client: &KubernetesClient<R>) -> Result<String, KubeError> {
    client.namespace_uid(KUBE_SYSTEM)
}

/// Delete `namespace` and wait until it is gone; nothing to do if it is absent
pub fn delete_namespace_for_reinstall<R: KubectlRunner>(
    client: &KubernetesClient<R>,
    namespace: &str,
) -> Result<(), KubeError> {
    delete_namespace_for_reinstall_with_clock(client, namespace, SystemClock::start())
}

#[instrument(skip(client, clock))]
pub fn delete_namespace_for_reinstall_with_clock<R: KubectlRunner, C: Clock>(
    client: &KubernetesClient<R>,
    namespace: &str,
    clock: C,
) -> Result<(), KubeError> {
    if !client.namespace_exists(namespace) {
        return Ok(());
    }

    let mut config =
        namespace_deletion_wait_config(format!("Deleting namespace [{namespace}] in the cluster"))?;
    if client.progress_hidden() {
        config = config.without_progress();
    }
    let mut operation = NamespaceDeleteOperation::new(namespace, client);
    let result = Waiter::with_clock(config, clock).wait_for(&KubernetesPoller, &mut operation);
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) if err.is_timeout() => {
            return Err(KubeError::NamespaceDeleteTimeout {
                namespace: namespace.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    if !outcome.succeeded {
        return Err(KubeError::NamespaceDelete {
            namespace: namespace.to_string(),
            error: outcome.error.unwrap_or_default(),
        });
    }
    info!(namespace, "namespace deleted");
    Ok(())
}

/// Wait until every pod of `deployment` runs `image` and is available
pub fn wait_for_deployment_rollout<R: KubectlRunner>(
    client: &KubernetesClient<R>,
    namespace: &str,
    deployment: &str,
    image: &str,
    config: &WaitConfig,
) -> Result<(), KubeError> {
    wait_for_deployment_rollout_with_clock(
        client,
        namespace,
        deployment,
        image,
        config,
        SystemClock::start(),
    )
}

#[instrument(skip(client, config, clock))]
pub fn wait_for_deployment_rollout_with_clock<R: KubectlRunner, C: Clock>(
    client: &KubernetesClient<R>,
    namespace: &str,
    deployment: &str,
    image: &str,
    config: &WaitConfig,
    clock: C,
) -> Result<(), KubeError> {
    let mut config = config.clone();
    if client.progress_hidden() {
        config = config.without_progress();
    }
    let mut operation = DeploymentPodsAvailableOperation::new(namespace, deployment, image, client);
    let outcome = Waiter::with_clock(config, clock).wait_for(&KubernetesPoller, &mut operation)?;
    if !outcome.succeeded {
        return Err(KubeError::Rollout {
            namespace: namespace.to_string(),
            deployment: deployment.to_string(),
            error: outcome.error.unwrap_or_default(),
        });
    }
    Ok(())
}
