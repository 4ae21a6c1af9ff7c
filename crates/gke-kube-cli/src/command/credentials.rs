use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use gke_kube::kubeconfig::default_path;
use gke_kube::{Cluster, ClusterConfig, EndpointOptions, KubeEnv, PersistOptions, Settings};
use tracing::debug;

use super::{ApiOpt, load_settings};
use crate::notify::Notify;

#[derive(Debug, Subcommand)]
pub enum CredentialsCmd {
    /// Write credentials of a cluster into the kubeconfig and select its context
    Get(GetCredentialsOpt),
    /// Show the stored credentials of a cluster
    Load(ClusterKeyOpt),
    /// Remove the stored credentials of a cluster
    Purge(ClusterKeyOpt),
}

#[derive(Debug, Args, Clone, Default)]
pub struct KubeconfigOpt {
    /// Kubeconfig file to update instead of $KUBECONFIG or ~/.kube/config
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Name of the context instead of gke_{project}_{zone}_{cluster}
    #[arg(long, value_name = "NAME")]
    pub kubecontext_override: Option<String>,
}

impl KubeconfigOpt {
    fn path(&self, env: &KubeEnv) -> Result<PathBuf> {
        match &self.kubeconfig {
            Some(path) => Ok(path.clone()),
            None => default_path(env).context("unable to locate the kubeconfig file"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct GetCredentialsOpt {
    /// Cluster resource as returned by the container API, in JSON
    #[arg(
        long,
        value_name = "FILE",
        required_unless_present = "cluster",
        conflicts_with = "cluster"
    )]
    pub cluster_file: Option<PathBuf>,

    /// Name of the cluster to fetch from the container API
    #[arg(long, requires = "location")]
    pub cluster: Option<String>,

    /// Zone or region of the cluster
    #[arg(long, alias = "zone", alias = "region")]
    pub location: Option<String>,

    #[arg(long)]
    pub project: String,

    /// Use the private endpoint of the control plane
    #[arg(long, conflicts_with = "dns_endpoint")]
    pub internal_ip: bool,

    /// Use the private endpoint reachable from this cross-connect subnetwork
    #[arg(long, value_name = "SUBNETWORK", conflicts_with = "dns_endpoint")]
    pub cross_connect_subnetwork: Option<String>,

    /// Use the private FQDN of the control plane
    #[arg(long, conflicts_with = "dns_endpoint")]
    pub private_endpoint_fqdn: bool,

    /// Use the DNS based endpoint of the control plane
    #[arg(long)]
    pub dns_endpoint: bool,

    /// Service account kubectl should impersonate
    #[arg(long, value_name = "ACCOUNT")]
    pub impersonate_service_account: Option<String>,

    #[command(flatten)]
    pub kubeconfig: KubeconfigOpt,

    #[command(flatten)]
    pub api: ApiOpt,
}

impl GetCredentialsOpt {
    fn persist_options(&self) -> PersistOptions {
        PersistOptions {
            endpoint: EndpointOptions {
                use_internal_ip: self.internal_ip,
                cross_connect_subnetwork: self.cross_connect_subnetwork.clone(),
                use_private_fqdn: self.private_endpoint_fqdn,
                use_dns_endpoint: self.dns_endpoint,
            },
            impersonate_service_account: self.impersonate_service_account.clone(),
            kubecontext_override: self.kubeconfig.kubecontext_override.clone(),
        }
    }

    fn cluster(&self, env: &KubeEnv, settings: &Settings) -> Result<Cluster> {
        match (&self.cluster_file, &self.cluster, &self.location) {
            (Some(file), _, _) => read_cluster_file(file),
            (None, Some(name), Some(location)) => {
                let client = self.api.client(env, settings)?;
                debug!(%name, %location, "fetching cluster");
                Ok(client.get_cluster(&self.project, location, name)?)
            }
            _ => Err(anyhow!("either --cluster-file or --cluster with --location is required")),
        }
    }

    fn process(self, notify: Notify) -> Result<()> {
        let env = KubeEnv::from_process();
        let settings = load_settings(&env)?;
        let cluster = self.cluster(&env, &settings)?;
        let path = self.kubeconfig.path(&env)?;
        debug!(path = %path.display(), cluster = %cluster.name, "persisting credentials");

        let config =
            ClusterConfig::persist(&cluster, &self.project, &self.persist_options(), &settings, &path)?;
        notify.done(format!(
            "kubeconfig entry generated for {}.",
            config.cluster_name.bold()
        ));
        Ok(())
    }
}

fn read_cluster_file(path: &Path) -> Result<Cluster> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("unable to read {}", path.display()))?;
    serde_yaml::from_str(&raw)
        .with_context(|| format!("invalid cluster resource {}", path.display()))
}

#[derive(Debug, Parser)]
pub struct ClusterKeyOpt {
    #[arg(long)]
    pub cluster: String,

    /// Zone or region of the cluster
    #[arg(long, alias = "region", alias = "location")]
    pub zone: String,

    #[arg(long)]
    pub project: String,

    #[command(flatten)]
    pub kubeconfig: KubeconfigOpt,
}

impl CredentialsCmd {
    pub fn process(self, notify: Notify) -> Result<()> {
        match self {
            Self::Get(opt) => opt.process(notify),
            Self::Load(opt) => {
                let env = KubeEnv::from_process();
                let path = opt.kubeconfig.path(&env)?;
                let loaded = ClusterConfig::load(
                    &opt.cluster,
                    &opt.zone,
                    &opt.project,
                    opt.kubeconfig.kubecontext_override.as_deref(),
                    &path,
                )?;
                match loaded {
                    Some(config) => {
                        println!("context: {}", config.kube_context());
                        println!("server:  {}", config.server);
                    }
                    None => notify.warn(format!(
                        "no valid credentials for cluster {} in {}",
                        opt.cluster,
                        path.display()
                    )),
                }
                Ok(())
            }
            Self::Purge(opt) => {
                let env = KubeEnv::from_process();
                let settings = load_settings(&env)?;
                let path = opt.kubeconfig.path(&env)?;
                let base = settings.container_config_path()?;
                ClusterConfig::purge(
                    &opt.cluster,
                    &opt.zone,
                    &opt.project,
                    opt.kubeconfig.kubecontext_override.as_deref(),
                    &base,
                    &path,
                )?;
                notify.done(format!("Credentials of {} removed", opt.cluster.bold()));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_flags_map_to_persist_options() {
        let opt = GetCredentialsOpt::try_parse_from([
            "get",
            "--cluster-file",
            "c.json",
            "--project",
            "p",
            "--cross-connect-subnetwork",
            "projects/p/regions/r/subnetworks/s",
            "--kubecontext-override",
            "prod",
        ])
        .expect("valid args");
        let options = opt.persist_options();
        assert_eq!(
            options.endpoint.cross_connect_subnetwork.as_deref(),
            Some("projects/p/regions/r/subnetworks/s")
        );
        assert!(!options.endpoint.use_dns_endpoint);
        assert_eq!(options.kubecontext_override.as_deref(), Some("prod"));
    }

    #[test]
    fn cluster_by_name_needs_location() {
        assert!(GetCredentialsOpt::try_parse_from(["get", "--project", "p"]).is_err());
        assert!(
            GetCredentialsOpt::try_parse_from(["get", "--cluster", "prod", "--project", "p"])
                .is_err()
        );
        assert!(
            GetCredentialsOpt::try_parse_from([
                "get",
                "--cluster-file",
                "c.json",
                "--cluster",
                "prod",
                "--zone",
                "us-central1-a",
                "--project",
                "p",
            ])
            .is_err()
        );

        let opt = GetCredentialsOpt::try_parse_from([
            "get",
            "--cluster",
            "prod",
            "--zone",
            "us-central1-a",
            "--project",
            "p",
            "--access-token",
            "ya29.token",
        ])
        .expect("valid args");
        assert_eq!(opt.cluster.as_deref(), Some("prod"));
        assert_eq!(opt.location.as_deref(), Some("us-central1-a"));
        assert_eq!(opt.cluster_file, None);
    }

    #[test]
    fn reads_cluster_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("cluster.json");
        fs::write(&file, r#"{"name": "prod", "location": "us-central1", "endpoint": "34.1.2.3"}"#)
            .expect("write");
        let cluster = read_cluster_file(&file).expect("cluster");
        assert_eq!(cluster.zone_id(), "us-central1");
        assert_eq!(cluster.endpoint.as_deref(), Some("34.1.2.3"));
    }

    #[test]
    fn explicit_kubeconfig_wins() {
        let opt = KubeconfigOpt {
            kubeconfig: Some(PathBuf::from("/tmp/kube")),
            ..Default::default()
        };
        assert_eq!(
            opt.path(&KubeEnv::default()).expect("path"),
            PathBuf::from("/tmp/kube")
        );
    }

    #[test]
    fn region_alias() {
        let opt = ClusterKeyOpt::try_parse_from([
            "load", "--cluster", "prod", "--region", "us-central1", "--project", "p",
        ])
        .expect("valid args");
        assert_eq!(opt.zone, "us-central1");
    }
}
