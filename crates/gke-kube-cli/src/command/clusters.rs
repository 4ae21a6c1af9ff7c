use anyhow::Result;
use clap::{Parser, Subcommand};
use gke_kube::{Cluster, KubeEnv};
use tracing::debug;

use super::{ApiOpt, load_settings};
use crate::notify::Notify;

#[derive(Debug, Subcommand)]
pub enum ClustersCmd {
    /// List the clusters of a project
    List(ListClustersOpt),
}

#[derive(Debug, Parser)]
pub struct ListClustersOpt {
    #[arg(long)]
    pub project: String,

    /// Zone or region to list; every location when omitted
    #[arg(long, alias = "zone", alias = "region")]
    pub location: Option<String>,

    #[command(flatten)]
    pub api: ApiOpt,
}

impl ClustersCmd {
    pub fn process(self, notify: Notify) -> Result<()> {
        match self {
            Self::List(opt) => {
                let env = KubeEnv::from_process();
                let settings = load_settings(&env)?;
                let client = opt.api.client(&env, &settings)?;
                let clusters = client.list_clusters(&opt.project, opt.location.as_deref())?;
                debug!(count = clusters.len(), "listed clusters");
                if clusters.is_empty() {
                    notify.warn(format!("no clusters found in {}", opt.project));
                    return Ok(());
                }
                print!("{}", format_clusters(&clusters));
                Ok(())
            }
        }
    }
}

fn format_clusters(clusters: &[Cluster]) -> String {
    let width = clusters
        .iter()
        .map(|cluster| cluster.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let location_width = clusters
        .iter()
        .map(|cluster| cluster.zone_id().len())
        .max()
        .unwrap_or(0)
        .max("LOCATION".len());
    let mut out = format!(
        "{:width$}  {:location_width$}  {}\n",
        "NAME", "LOCATION", "ENDPOINT"
    );
    for cluster in clusters {
        out.push_str(&format!(
            "{:width$}  {:location_width$}  {}\n",
            cluster.name,
            cluster.zone_id(),
            cluster.endpoint.as_deref().unwrap_or("-")
        ));
    }
    out
}
