use std::io::Error as IoError;
use std::path::PathBuf;

use gke_waiter::{HttpStatus, WaitError};

use crate::api_error::ApiError;

/// Errors locating the kubectl binary
#[derive(thiserror::Error, Debug)]
pub enum KubectlError {
    #[error("kubectl not installed.")]
    NotInstalled,
}

/// Errors raised while talking to a cluster through kubectl
#[derive(thiserror::Error, Debug)]
pub enum KubeError {
    #[error("Failed to get the UID of the cluster: {0}")]
    NamespaceUid(String),
    #[error("Failed to get events: {0}")]
    Events(String),
    #[error("Failed to list namespaces in the cluster: {0}")]
    ListNamespaces(String),
    #[error("Error retrieving Membership CRD: {0}")]
    MembershipCrdLookup(String),
    #[error("Error retrieving membership CR: {0}")]
    MembershipCr(String),
    #[error("Error retrieving membership CRD: {0}")]
    MembershipCrd(String),
    #[error("Error retrieving membership id: {0}")]
    MembershipOwner(String),
    #[error("Membership CRD creation failed to complete: {0}")]
    MembershipCrdCreation(String),
    #[error("Failed to apply Membership CR to cluster: {0}")]
    ApplyMembershipCr(String),
    /// Namespace was still present when the deletion wait ran out
    #[error("Could not delete namespace [{namespace}] from cluster.")]
    NamespaceDeleteTimeout { namespace: String },
    #[error("Could not delete namespace [{namespace}] from cluster. Error: {error}")]
    NamespaceDelete { namespace: String, error: String },
    #[error("Deployment {namespace}/{deployment} failed to roll out: {error}")]
    Rollout {
        namespace: String,
        deployment: String,
        error: String,
    },
    #[error(
        "Please specify --kubeconfig, set the $KUBECONFIG environment variable, or ensure that $HOME/.kube/config exists"
    )]
    MissingKubeconfig,
    #[error("argument --context: Must be specified.")]
    MissingContext,
    #[error("context [{context}] does not exist in kubeconfig [{}]", kubeconfig.display())]
    UnknownContext { context: String, kubeconfig: PathBuf },
    #[error(transparent)]
    Kubectl(#[from] KubectlError),
    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),
    #[error(transparent)]
    Wait(#[from] WaitError),
}

/// Errors reading, writing or building kubeconfig files
#[derive(thiserror::Error, Debug)]
pub enum KubeconfigError {
    #[error("unable to load kubeconfig for {}: {source}", path.display())]
    Load {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid kubeconfig {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
    #[error("Failed to write kubeconfig")]
    Serialize(#[from] serde_yaml::Error),
    #[error("kubeconfig io error")]
    Io(#[from] IoError),
    #[error("environment variable {0} or KUBECONFIG must be set to store credentials for kubectl")]
    MissingEnvVar(&'static str),
    #[error("either auth_provider or cert & key must be provided")]
    MissingAuth,
    #[error(
        "Path to sdk installation not found. Please check your installation or use the `--auth-provider-cmd-path` flag to provide the path to gcloud manually."
    )]
    SdkBinPathNotFound,
}

/// Errors persisting or removing cluster credentials
#[derive(thiserror::Error, Debug)]
pub enum ClusterConfigError {
    #[error("cluster {0} is missing endpoint. Is it still PROVISIONING?")]
    MissingEndpoint(String),
    #[error("cluster {0} is not a private cluster.")]
    NonPrivateCluster(String),
    #[error("cluster {0} is missing private endpoint. Is it still PROVISIONING?")]
    MissingPrivateEndpoint(String),
    #[error("cluster {0} is missing private fqdn.")]
    MissingPrivateFqdn(String),
    #[error("cluster {0} is missing DNSEndpointConfig.")]
    MissingDnsEndpointConfig(String),
    #[error("cluster {cluster} is missing cross-connect subnetwork {subnetwork}.")]
    MissingCrossConnect { cluster: String, subnetwork: String },
    #[error("IP access is disabled for cluster {0}.")]
    IpEndpointsDisabled(String),
    #[error(
        "controlPlaneEndpointsConfig.dnsEndpointConfig.allowExternalTraffic is disabled for cluster {0}."
    )]
    AllowExternalTrafficDisabled(String),
    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("Failed to remove cluster config directory")]
    Io(#[from] IoError),
}

/// Errors loading or saving `settings.toml`
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("Unable to determine the user config directory")]
    NoConfigDir,
    #[error("Settings io error")]
    Io(#[from] IoError),
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Unable to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors reading clusters from the container API
#[derive(thiserror::Error, Debug)]
pub enum ContainerApiError {
    #[error("{error}\nCould not find [{name}] in [{wrong_zone}].\nDid you mean [{name}] in [{zone}]?")]
    WrongZone {
        error: ApiError,
        name: String,
        wrong_zone: String,
        zone: String,
    },
    #[error("{error}\nNo cluster named '{name}' in {project}.")]
    NoSuchCluster {
        error: ApiError,
        name: String,
        project: String,
    },
    #[error("{0}\nPermission denied for the container API.")]
    PermissionDenied(ApiError),
    #[error("{0}\nInvalid container API request.")]
    BadRequest(ApiError),
    #[error("{0}")]
    NotFound(ApiError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("container API transport error: {0}")]
    Transport(String),
    #[error("invalid container API response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("gcloud not found. Set CLOUDSDK_AUTH_ACCESS_TOKEN or pass --access-token.")]
    MissingGcloud,
    #[error("unable to get an access token: {0}")]
    AccessToken(String),
}

impl HttpStatus for ContainerApiError {
    fn http_status(&self) -> Option<u16> {
        match self {
            Self::Api(err)
            | Self::PermissionDenied(err)
            | Self::BadRequest(err)
            | Self::NotFound(err) => Some(err.status),
            Self::WrongZone { error, .. } | Self::NoSuchCluster { error, .. } => {
                Some(error.status)
            }
            _ => None,
        }
    }
}
