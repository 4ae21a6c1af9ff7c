use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::Colorize;
use gke_kube::hub::{cluster_uuid, delete_namespace_for_reinstall, wait_for_deployment_rollout};
use gke_waiter::{DEFAULT_MAX_WAIT, DEFAULT_SLEEP, DEFAULT_WAIT_CEILING, WaitConfig};
use tracing::debug;

use super::KubeOpt;
use crate::notify::Notify;

#[derive(Debug, Parser)]
pub struct ClusterUuidOpt {
    #[command(flatten)]
    pub kube: KubeOpt,
}

impl ClusterUuidOpt {
    pub fn process(self, notify: Notify) -> Result<()> {
        let client = self.kube.client(notify.is_quiet())?;
        let uid = cluster_uuid(&client)?;
        println!("{uid}");
        Ok(())
    }
}

#[derive(Debug, Subcommand)]
pub enum NamespaceCmd {
    /// Delete a namespace and wait until it is gone
    Delete(NamespaceDeleteOpt),
}

#[derive(Debug, Parser)]
pub struct NamespaceDeleteOpt {
    /// Namespace to delete
    pub namespace: String,

    #[command(flatten)]
    pub kube: KubeOpt,
}

impl NamespaceCmd {
    pub fn process(self, notify: Notify) -> Result<()> {
        match self {
            Self::Delete(opt) => {
                let client = opt.kube.client(notify.is_quiet())?;
                delete_namespace_for_reinstall(&client, &opt.namespace)?;
                notify.done(format!("Namespace {} deleted", opt.namespace.bold()));
                Ok(())
            }
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum MembershipCmd {
    /// Apply the membership CRD and optionally a membership resource
    Apply(MembershipApplyOpt),
    /// Print the membership resource of the cluster
    Show(MembershipShowOpt),
    /// Delete the membership resource of the cluster
    Delete(MembershipShowOpt),
}

#[derive(Debug, Parser)]
pub struct MembershipApplyOpt {
    /// Manifest of the membership CRD
    #[arg(long, value_name = "FILE")]
    pub crd: PathBuf,

    /// Manifest of the membership resource
    #[arg(long, value_name = "FILE")]
    pub cr: Option<PathBuf>,

    #[command(flatten)]
    pub kube: KubeOpt,
}

#[derive(Debug, Parser)]
pub struct MembershipShowOpt {
    #[command(flatten)]
    pub kube: KubeOpt,
}

impl MembershipCmd {
    pub fn process(self, notify: Notify) -> Result<()> {
        match self {
            Self::Apply(opt) => {
                let crd = read_manifest(&opt.crd)?;
                let cr = opt.cr.as_deref().map(read_manifest).transpose()?;
                let client = opt.kube.client(notify.is_quiet())?;
                client.apply_membership(Some(&crd), cr.as_deref())?;
                notify.done("Membership resources applied");
                Ok(())
            }
            Self::Show(opt) => {
                let client = opt.kube.client(notify.is_quiet())?;
                if !client.membership_crd_exists()? {
                    notify.warn("membership CRD is not installed");
                    return Ok(());
                }
                match client.membership_owner_id()? {
                    Some(owner) => notify.info(format!("owner: {}", owner.bold())),
                    None => notify.warn("membership has no owner"),
                }
                println!("{}", client.membership_cr()?);
                Ok(())
            }
            Self::Delete(opt) => {
                let client = opt.kube.client(notify.is_quiet())?;
                let outcome = client.delete_membership();
                if outcome.is_not_found() {
                    notify.warn("no membership resource found");
                    return Ok(());
                }
                outcome
                    .into_result()
                    .map_err(|err| anyhow!("unable to delete membership: {err}"))?;
                notify.done("Membership deleted");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum RolloutCmd {
    /// Wait until a deployment runs the given image on every replica
    Wait(RolloutWaitOpt),
}

#[derive(Debug, Parser)]
pub struct RolloutWaitOpt {
    #[arg(long)]
    pub namespace: String,

    #[arg(long)]
    pub deployment: String,

    /// Image every container of the deployment must run
    #[arg(long)]
    pub image: String,

    /// Give up after this many milliseconds
    #[arg(long, default_value_t = DEFAULT_MAX_WAIT.as_millis() as u64)]
    pub max_wait_ms: u64,

    /// First delay between polls in milliseconds
    #[arg(long, default_value_t = DEFAULT_SLEEP.as_millis() as u64)]
    pub sleep_ms: u64,

    /// Longest delay between polls in milliseconds
    #[arg(long, default_value_t = DEFAULT_WAIT_CEILING.as_millis() as u64)]
    pub wait_ceiling_ms: u64,

    #[command(flatten)]
    pub kube: KubeOpt,
}

impl RolloutCmd {
    pub fn process(self, notify: Notify) -> Result<()> {
        match self {
            Self::Wait(opt) => {
                let config = WaitConfig::from_millis(
                    format!("Waiting for deployment {} to roll out", opt.deployment),
                    0,
                    opt.max_wait_ms,
                    opt.wait_ceiling_ms,
                    opt.sleep_ms,
                )?;
                debug!(?config, "rollout wait");
                let client = opt.kube.client(notify.is_quiet())?;
                wait_for_deployment_rollout(
                    &client,
                    &opt.namespace,
                    &opt.deployment,
                    &opt.image,
                    &config,
                )?;
                notify.done(format!(
                    "Deployment {}/{} rolled out",
                    opt.namespace,
                    opt.deployment.bold()
                ));
                Ok(())
            }
        }
    }
}

fn read_manifest(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("unable to read {}", path.display()))
}
