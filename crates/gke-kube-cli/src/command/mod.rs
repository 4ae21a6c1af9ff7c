pub mod cluster;
pub mod clusters;
pub mod credentials;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gke_kube::{
    ContainerClient, KubeEnv, KubeFlags, Kubectl, KubernetesClient, ProcessorVersion, Settings,
    UreqTransport, access_token,
};

/// Cluster selection shared by commands that talk to a cluster
#[derive(Debug, Args, Clone, Default)]
pub struct KubeOpt {
    /// Kubeconfig file to use instead of $KUBECONFIG or ~/.kube/config
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context of the target cluster
    #[arg(long, value_name = "NAME")]
    pub context: Option<String>,

    /// Fall back to the kubeconfig's current context when --context is missing
    #[arg(long, default_value_t = false)]
    pub legacy: bool,
}

impl KubeOpt {
    pub fn flags(&self) -> KubeFlags {
        KubeFlags {
            kubeconfig: self.kubeconfig.clone(),
            context: self.context.clone(),
        }
    }

    pub fn version(&self) -> ProcessorVersion {
        if self.legacy {
            ProcessorVersion::Legacy
        } else {
            ProcessorVersion::Current
        }
    }

    /// kubectl backed client for the selected cluster
    pub fn client(&self, quiet: bool) -> Result<KubernetesClient<Kubectl>> {
        let env = KubeEnv::from_process();
        let settings = load_settings(&env)?;
        let client = KubernetesClient::from_flags(&self.flags(), &env, &settings, self.version())
            .context("unable to select a cluster")?;
        Ok(client.hide_progress(quiet))
    }
}

/// Credentials for the container API
#[derive(Debug, Args, Clone, Default)]
pub struct ApiOpt {
    /// Bearer token instead of $CLOUDSDK_AUTH_ACCESS_TOKEN or `gcloud auth print-access-token`
    #[arg(long, value_name = "TOKEN")]
    pub access_token: Option<String>,
}

impl ApiOpt {
    pub fn client(
        &self,
        env: &KubeEnv,
        settings: &Settings,
    ) -> Result<ContainerClient<UreqTransport>> {
        let token = match &self.access_token {
            Some(token) => token.clone(),
            None => access_token(env, settings).context("unable to authenticate")?,
        };
        let transport = UreqTransport::from_env(env)?;
        Ok(ContainerClient::new(transport, token))
    }
}

pub fn load_settings(env: &KubeEnv) -> Result<Settings> {
    let settings = Settings::open().context("unable to read settings")?;
    Ok(settings.with_env(env))
}
