use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::client::KubernetesClient;
use crate::env::KubeEnv;
use crate::error::{KubeError, KubectlError};
use crate::kubeconfig::Kubeconfig;
use crate::kubectl::{KubeTarget, Kubectl, check_kubectl_installed};
use crate::settings::Settings;

/// Behaviour when no `--context` is given
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessorVersion {
    /// `--context` is required
    #[default]
    Current,
    /// Fall back to the kubeconfig's current context
    Legacy,
}

/// Cluster selection flags shared by every command that talks to a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeFlags {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

/// Resolves the kubeconfig file and context a command should use
#[derive(Debug, Clone)]
pub struct KubeconfigProcessor {
    version: ProcessorVersion,
    kubectl: PathBuf,
}

impl KubeconfigProcessor {
    /// Fails when kubectl is not installed
    pub fn new(version: ProcessorVersion) -> Result<Self, KubeError> {
        let kubectl = check_kubectl_installed().ok_or(KubectlError::NotInstalled)?;
        Ok(Self::with_kubectl(version, kubectl))
    }

    pub fn with_kubectl(version: ProcessorVersion, kubectl: impl Into<PathBuf>) -> Self {
        Self {
            version,
            kubectl: kubectl.into(),
        }
    }

    pub fn kubectl(&self) -> &Path {
        &self.kubectl
    }

    /// Kubeconfig and context from flags and environment.
    ///
    /// `None` means kubectl should use its in-cluster configuration.
    #[instrument(skip(self, env))]
    pub fn kubeconfig_and_context(
        &self,
        flags: &KubeFlags,
        env: &KubeEnv,
    ) -> Result<Option<KubeTarget>, KubeError> {
        if flags.kubeconfig.is_none() && env.is_in_cluster() {
            debug!("using in-cluster configuration");
            return Ok(None);
        }

        let kubeconfig = match flags.kubeconfig.clone().or_else(|| env.kubeconfig()) {
            Some(path) => expand_home(&path, env).ok_or(KubeError::MissingKubeconfig)?,
            None => env
                .home_dir()
                .or_else(dirs::home_dir)
                .map(|home| home.join(".kube").join("config"))
                .ok_or(KubeError::MissingKubeconfig)?,
        };
        let config = Kubeconfig::load_from_file(&kubeconfig)?;

        let context = match (&flags.context, self.version) {
            (Some(context), _) => context.clone(),
            (None, ProcessorVersion::Legacy) => config
                .current_context()
                .map(str::to_string)
                .ok_or(KubeError::MissingContext)?,
            (None, ProcessorVersion::Current) => return Err(KubeError::MissingContext),
        };

        if config.context(&context).is_none() {
            return Err(KubeError::UnknownContext {
                context,
                kubeconfig,
            });
        }

        Ok(Some(KubeTarget {
            kubeconfig,
            context,
        }))
    }
}

/// Replace a leading `~` with the home directory
fn expand_home(path: &Path, env: &KubeEnv) -> Option<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => env
            .home_dir()
            .or_else(dirs::home_dir)
            .map(|home| home.join(rest)),
        Err(_) => Some(path.to_path_buf()),
    }
}

impl KubernetesClient<Kubectl> {
    /// Client for the cluster selected by `flags`
    pub fn from_flags(
        flags: &KubeFlags,
        env: &KubeEnv,
        settings: &Settings,
        version: ProcessorVersion,
    ) -> Result<Self, KubeError> {
        let processor = KubeconfigProcessor::new(version)?;
        let target = processor.kubeconfig_and_context(flags, env)?;
        let kubectl = Kubectl::new(processor.kubectl())
            .with_target(target)
            .with_request_timeout(&settings.kubectl_request_timeout);
        Ok(Self::new(kubectl))
    }
}
