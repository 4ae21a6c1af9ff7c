mod command;
mod notify;

use anyhow::Result;
use clap::{Args, Parser};

use self::command::cluster::{ClusterUuidOpt, MembershipCmd, NamespaceCmd, RolloutCmd};
use self::command::clusters::ClustersCmd;
use self::command::credentials::CredentialsCmd;
use self::notify::Notify;

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let args = Cli::parse();

    args.process()
}

#[derive(Debug, Args, Clone, Default)]
pub struct GlobalOptions {
    /// Suppress stdout notifications and progress spinners
    #[clap(short = 'q', long, global = true, default_value_t = false)]
    quiet: bool,
}

#[derive(Debug, Parser)]
#[command(
    about = "Manage GKE cluster credentials and hub resources through kubectl",
    name = "gke-kube",
    max_term_width = 100
)]
pub struct Cli {
    #[clap(flatten)]
    global_opts: GlobalOptions,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Print the UID of the kube-system namespace
    #[command(name = "cluster-uuid")]
    ClusterUuid(ClusterUuidOpt),
    /// Manage namespaces
    #[command(subcommand)]
    Namespace(NamespaceCmd),
    /// Manage the hub membership resources
    #[command(subcommand)]
    Membership(MembershipCmd),
    /// Follow deployment rollouts
    #[command(subcommand)]
    Rollout(RolloutCmd),
    /// Manage cluster credentials in a kubeconfig file
    #[command(subcommand)]
    Credentials(CredentialsCmd),
    /// Read clusters from the container API
    #[command(subcommand)]
    Clusters(ClustersCmd),
}

impl Cli {
    fn process(self) -> Result<()> {
        let notify = Notify::new(self.global_opts.quiet);
        match self.command {
            Command::ClusterUuid(opt) => opt.process(notify),
            Command::Namespace(cmd) => cmd.process(notify),
            Command::Membership(cmd) => cmd.process(notify),
            Command::Rollout(cmd) => cmd.process(notify),
            Command::Credentials(cmd) => cmd.process(notify),
            Command::Clusters(cmd) => cmd.process(notify),
        }
    }
}
