use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;

use fluvio_command::{CommandErrorKind, CommandExt};
use tracing::{debug, instrument, warn};

use crate::error::KubectlError;

pub const KUBECTL: &str = "kubectl";
pub const DEFAULT_REQUEST_TIMEOUT: &str = "20s";
pub const MISSING_KUBECTL_MSG: &str = "\
Accessing a Kubernetes Engine cluster requires the kubernetes commandline
client [kubectl]. To install, run
  $ gcloud components install kubectl
";

/// Marker kubectl prints for missing resources, e.g. `Error from server (NotFound)`
const NOT_FOUND_MARKER: &str = "NotFound";

/// Result of a single kubectl invocation.
///
/// Callers match on the variant; the text of a failure is only for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubectlOutcome {
    /// Exit code zero, with stdout
    Ok(String),
    /// The server reported the resource does not exist, with stderr
    NotFound(String),
    /// Any other failure, with stderr or a synthesized message
    Failed(String),
}

impl KubectlOutcome {
    /// Classify a failure message
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(NOT_FOUND_MARKER) {
            Self::NotFound(message)
        } else {
            Self::Failed(message)
        }
    }

    fn from_exit(code: i32, output: &Output) -> Self {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.is_empty() {
            Self::Failed(format!("kubectl exited with return code {code}"))
        } else {
            Self::failure(stderr)
        }
    }

    fn from_output(output: Output) -> Self {
        match output.status.code() {
            Some(0) => Self::Ok(String::from_utf8_lossy(&output.stdout).to_string()),
            Some(code) => Self::from_exit(code, &output),
            None => Self::Failed("kubectl was terminated and has no exit code".to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Error text, if the invocation did not succeed
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::NotFound(err) | Self::Failed(err) => Some(err),
        }
    }

    /// Stdout on success, the error text otherwise
    pub fn into_result(self) -> Result<String, String> {
        match self {
            Self::Ok(out) => Ok(out),
            Self::NotFound(err) | Self::Failed(err) => Err(err),
        }
    }
}

/// Something that can run kubectl with the given arguments
pub trait KubectlRunner {
    fn run(&self, args: &[&str], stdin: Option<&str>) -> KubectlOutcome;
}

impl<R: KubectlRunner + ?Sized> KubectlRunner for &R {
    fn run(&self, args: &[&str], stdin: Option<&str>) -> KubectlOutcome {
        (**self).run(args, stdin)
    }
}

/// Kubeconfig file and context every invocation is pinned to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeTarget {
    pub kubeconfig: PathBuf,
    pub context: String,
}

/// Runs the kubectl binary as a child process
#[derive(Debug, Clone)]
pub struct Kubectl {
    program: PathBuf,
    target: Option<KubeTarget>,
    request_timeout: String,
}

impl Kubectl {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            target: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT.to_string(),
        }
    }

    /// Find kubectl on `PATH`
    pub fn locate() -> Result<Self, KubectlError> {
        check_kubectl_installed()
            .map(Self::new)
            .ok_or(KubectlError::NotInstalled)
    }

    pub fn with_target(mut self, target: Option<KubeTarget>) -> Self {
        self.target = target;
        self
    }

    pub fn with_request_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.request_timeout = timeout.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn target(&self) -> Option<&KubeTarget> {
        self.target.as_ref()
    }

    /// Build the command line without running it
    pub fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(target) = &self.target {
            cmd.arg("--context")
                .arg(&target.context)
                .arg("--kubeconfig")
                .arg(&target.kubeconfig)
                .arg("--request-timeout")
                .arg(&self.request_timeout);
        }
        cmd.args(args);
        cmd
    }

    /// `stdin` is written from its own thread; the child is reaped even if it never reads it
    fn run_with_stdin(&self, mut cmd: Command, stdin: &str) -> std::io::Result<Output> {
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .log()
            .spawn()?;
        let writer = child.stdin.take().map(|mut pipe| {
            let input = stdin.to_string();
            thread::spawn(move || match pipe.write_all(input.as_bytes()) {
                Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
                result => result,
            })
        });
        let output = child.wait_with_output()?;
        if let Some(handle) = writer {
            match handle.join() {
                Ok(Err(err)) => warn!(%err, "unable to write kubectl stdin"),
                Err(_) => warn!("kubectl stdin writer panicked"),
                Ok(Ok(())) => {}
            }
        }
        Ok(output)
    }
}

impl KubectlRunner for Kubectl {
    #[instrument(skip(self, stdin), fields(program = %self.program.display()))]
    fn run(&self, args: &[&str], stdin: Option<&str>) -> KubectlOutcome {
        let mut cmd = self.command(args);

        let outcome = match stdin {
            Some(input) => match self.run_with_stdin(cmd, input) {
                Ok(output) => KubectlOutcome::from_output(output),
                Err(err) => KubectlOutcome::Failed(format!("unable to run kubectl: {err}")),
            },
            None => match cmd.result() {
                Ok(output) => KubectlOutcome::from_output(output),
                Err(err) => match err.source {
                    CommandErrorKind::ExitError(code, output) => {
                        KubectlOutcome::from_exit(code, &output)
                    }
                    CommandErrorKind::Terminated => KubectlOutcome::Failed(
                        "kubectl was terminated and has no exit code".to_string(),
                    ),
                    CommandErrorKind::IoError(io) => {
                        KubectlOutcome::Failed(format!("unable to run kubectl: {io}"))
                    }
                },
            },
        };

        if let Some(err) = outcome.error() {
            debug!(%err, not_found = outcome.is_not_found(), "kubectl failed");
        }
        outcome
    }
}

/// Path of kubectl on `PATH`, warning when it is missing
pub fn check_kubectl_installed() -> Option<PathBuf> {
    match which::which(KUBECTL) {
        Ok(path) => Some(path),
        Err(err) => {
            debug!(%err, "kubectl lookup failed");
            warn!("{}", MISSING_KUBECTL_MSG);
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        assert!(
            KubectlOutcome::failure(
                "Error from server (NotFound): namespaces \"gke-connect\" not found"
            )
            .is_not_found()
        );
        assert_eq!(
            KubectlOutcome::failure("Unable to connect to the server"),
            KubectlOutcome::Failed("Unable to connect to the server".to_string())
        );
    }

    #[test]
    fn test_target_flags_precede_args() {
        let kubectl = Kubectl::new("/usr/bin/kubectl").with_target(Some(KubeTarget {
            kubeconfig: PathBuf::from("/tmp/kubeconfig"),
            context: "gke_p_z_c".to_string(),
        }));
        let cmd = kubectl.command(&["get", "namespace", "kube-system"]);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(
            args,
            [
                "--context",
                "gke_p_z_c",
                "--kubeconfig",
                "/tmp/kubeconfig",
                "--request-timeout",
                "20s",
                "get",
                "namespace",
                "kube-system"
            ]
        );
    }

    #[test]
    fn test_no_target_passes_args_through() {
        let cmd = Kubectl::new("kubectl").command(&["version"]);
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["version"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_without_stderr() {
        let outcome = Kubectl::new("false").run(&[], None);
        assert_eq!(
            outcome,
            KubectlOutcome::Failed("kubectl exited with return code 1".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_stdin_is_piped() {
        let outcome = Kubectl::new("cat").run(&[], Some("kind: Namespace\n"));
        assert_eq!(outcome, KubectlOutcome::Ok("kind: Namespace\n".to_string()));
    }

    #[test]
    fn test_missing_binary_is_a_failure() {
        let outcome = Kubectl::new("/nonexistent/kubectl-binary").run(&["version"], None);
        assert!(matches!(outcome, KubectlOutcome::Failed(_)));
    }
}
