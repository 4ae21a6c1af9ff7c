use std::collections::BTreeMap;
use std::path::PathBuf;

pub const KUBECONFIG: &str = "KUBECONFIG";
pub const HOME: &str = "HOME";
pub const HOMEDRIVE: &str = "HOMEDRIVE";
pub const HOMEPATH: &str = "HOMEPATH";
pub const USERPROFILE: &str = "USERPROFILE";
pub const KUBERNETES_SERVICE_HOST: &str = "KUBERNETES_SERVICE_HOST";
pub const KUBERNETES_SERVICE_PORT: &str = "KUBERNETES_SERVICE_PORT";
pub const USE_GKE_GCLOUD_AUTH_PLUGIN: &str = "USE_GKE_GCLOUD_AUTH_PLUGIN";
pub const USE_CLIENT_CERTIFICATE: &str = "CLOUDSDK_CONTAINER_USE_CLIENT_CERTIFICATE";
pub const USE_APPLICATION_DEFAULT_CREDENTIALS: &str =
    "CLOUDSDK_CONTAINER_USE_APPLICATION_DEFAULT_CREDENTIALS";
pub const ACCESS_TOKEN: &str = "CLOUDSDK_AUTH_ACCESS_TOKEN";
pub const ALL_PROXY: &str = "ALL_PROXY";
pub const HTTPS_PROXY: &str = "HTTPS_PROXY";
pub const HTTP_PROXY: &str = "HTTP_PROXY";

const KNOWN_VARS: &[&str] = &[
    KUBECONFIG,
    HOME,
    HOMEDRIVE,
    HOMEPATH,
    USERPROFILE,
    KUBERNETES_SERVICE_HOST,
    KUBERNETES_SERVICE_PORT,
    USE_GKE_GCLOUD_AUTH_PLUGIN,
    USE_CLIENT_CERTIFICATE,
    USE_APPLICATION_DEFAULT_CREDENTIALS,
    ACCESS_TOKEN,
    ALL_PROXY,
    "all_proxy",
    HTTPS_PROXY,
    "https_proxy",
    HTTP_PROXY,
    "http_proxy",
];

/// Snapshot of the environment variables that influence kubeconfig handling.
///
/// Taken once at startup and passed down explicitly. Nothing in this crate
/// writes to the process environment; a kubeconfig chosen at runtime is
/// handed to `kubectl` with `--kubeconfig` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeEnv {
    vars: BTreeMap<String, String>,
}

impl KubeEnv {
    /// Capture the known variables from the current process
    pub fn from_process() -> Self {
        Self {
            vars: KNOWN_VARS
                .iter()
                .filter_map(|name| {
                    std::env::var(name)
                        .ok()
                        .map(|value| (name.to_string(), value))
                })
                .collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Value of `name`, treating an empty value as unset
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Boolean interpretation of `name`, `None` when unset
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }

    /// First entry of `KUBECONFIG`
    pub fn kubeconfig(&self) -> Option<PathBuf> {
        self.get(KUBECONFIG)
            .and_then(|value| std::env::split_paths(value).find(|p| !p.as_os_str().is_empty()))
    }

    /// Home directory the way kubectl resolves it
    pub fn home_dir(&self) -> Option<PathBuf> {
        if let Some(home) = self.get(HOME) {
            return Some(PathBuf::from(home));
        }
        if cfg!(windows) {
            if let (Some(drive), Some(path)) = (self.get(HOMEDRIVE), self.get(HOMEPATH)) {
                return Some(PathBuf::from(format!("{drive}{path}")));
            }
            return self.get(USERPROFILE).map(PathBuf::from);
        }
        None
    }

    /// Running inside a pod with a service account
    pub fn is_in_cluster(&self) -> bool {
        self.get(KUBERNETES_SERVICE_HOST).is_some() && self.get(KUBERNETES_SERVICE_PORT).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_unset() {
        let env = KubeEnv::from_pairs([(KUBECONFIG, ""), (HOME, "/home/dev")]);
        assert!(env.get(KUBECONFIG).is_none());
        assert!(env.kubeconfig().is_none());
        assert_eq!(env.home_dir(), Some(PathBuf::from("/home/dev")));
    }

    #[test]
    fn test_flag_parsing() {
        let env = KubeEnv::default()
            .with(USE_GKE_GCLOUD_AUTH_PLUGIN, "True")
            .with(USE_CLIENT_CERTIFICATE, "false");
        assert_eq!(env.flag(USE_GKE_GCLOUD_AUTH_PLUGIN), Some(true));
        assert_eq!(env.flag(USE_CLIENT_CERTIFICATE), Some(false));
        assert_eq!(env.flag(USE_APPLICATION_DEFAULT_CREDENTIALS), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_kubeconfig_first_entry() {
        let env = KubeEnv::default().with(KUBECONFIG, "/a/config:/b/config");
        assert_eq!(env.kubeconfig(), Some(PathBuf::from("/a/config")));
    }

    #[test]
    fn test_in_cluster_needs_host_and_port() {
        let env = KubeEnv::default().with(KUBERNETES_SERVICE_HOST, "10.0.0.1");
        assert!(!env.is_in_cluster());
        assert!(env.with(KUBERNETES_SERVICE_PORT, "443").is_in_cluster());
    }
}
