//! Helpers for reaching GKE clusters through kubectl.
//!
//! * [`KubernetesClient`] wraps the kubectl invocations used to register a
//!   cluster, with kubectl results classified once into [`KubectlOutcome`].
//! * [`hub`] has the long-running cluster operations built on `gke-waiter`.
//! * [`ContainerClient`] reads cluster resources from the container API.
//! * [`ClusterConfig`] persists, loads and purges cluster credentials in a
//!   kubeconfig file.

mod api_error;
mod client;
mod cluster_config;
mod container_api;
mod env;
mod error;
pub mod hub;
pub mod kubeconfig;
mod kubectl;
mod operations;
mod processor;
mod settings;

pub use api_error::{ApiError, reraise};
pub use client::{KubernetesClient, MEMBERSHIP_CRD_NAME};
pub use cluster_config::{
    Cluster, ClusterAuth, ClusterConfig, ControlPlaneEndpointsConfig, CrossConnectConfig,
    CrossConnectItem, DnsEndpointConfig, EndpointOptions, IpEndpointsConfig, MasterAuth,
    PersistOptions, PrivateClusterConfig, cluster_endpoint, get_config_dir, kube_context,
};
pub use container_api::{
    ALL_LOCATIONS, CONTAINER_API, ContainerClient, ContainerTransport, HttpResponse,
    UreqTransport, access_token,
};
pub use env::KubeEnv;
pub use error::{
    ClusterConfigError, ContainerApiError, KubeError, KubeconfigError, KubectlError, SettingsError,
};
pub use kubeconfig::Kubeconfig;
pub use kubectl::{
    DEFAULT_REQUEST_TIMEOUT, KubeTarget, Kubectl, KubectlOutcome, KubectlRunner,
    MISSING_KUBECTL_MSG, check_kubectl_installed,
};
pub use operations::{
    DeploymentPodsAvailableOperation, MembershipCrdCreationOperation, NamespaceDeleteOperation,
};
pub use processor::{KubeFlags, KubeconfigProcessor, ProcessorVersion};
pub use settings::Settings;

pub mod env_vars {
    pub use crate::env::{
        ACCESS_TOKEN, ALL_PROXY, HOME, HTTP_PROXY, HTTPS_PROXY, KUBECONFIG,
        KUBERNETES_SERVICE_HOST, KUBERNETES_SERVICE_PORT, USE_APPLICATION_DEFAULT_CREDENTIALS,
        USE_CLIENT_CERTIFICATE, USE_GKE_GCLOUD_AUTH_PLUGIN,
    };
}
