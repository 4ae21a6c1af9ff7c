use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, instrument};

use crate::env::{HOME, KubeEnv};
use crate::error::KubeconfigError;

pub const EXEC_AUTH_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";
pub const EXEC_AUTH_INSTALL_HINT: &str = "Install gke-gcloud-auth-plugin by running: gcloud components install gke-gcloud-auth-plugin";
pub const DEFAULT_CMD_ARGS: &str = "config config-helper --format=json";
pub const DEFAULT_TOKEN_KEY: &str = "{.credential.access_token}";
pub const DEFAULT_EXPIRY_KEY: &str = "{.credential.token_expiry}";

type Extra = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_provider: Option<AuthProviderEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
    /// Identity to impersonate
    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub impersonate: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl UserEntry {
    pub fn has_client_certificate(&self) -> bool {
        self.client_certificate_data.is_some() && self.client_key_data.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthProviderEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

/// Client-go credential plugin configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecConfig {
    pub command: String,
    pub api_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_hint: Option<String>,
    #[serde(default)]
    pub provide_cluster_info: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A kubeconfig file and the path it was loaded from.
///
/// Entries are kept in file order. Keys this model does not know about are
/// preserved when the file is written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub users: Vec<NamedUser>,
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub current_context: String,
    #[serde(default = "empty_mapping")]
    pub preferences: Value,
    #[serde(flatten)]
    pub extra: Extra,
    #[serde(skip)]
    path: PathBuf,
}

fn empty_mapping() -> Value {
    Value::Mapping(Default::default())
}

impl Kubeconfig {
    /// Kubeconfig with no entries, bound to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![],
            users: vec![],
            contexts: vec![],
            current_context: String::new(),
            preferences: empty_mapping(),
            extra: Extra::new(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, KubeconfigError> {
        let path = path.as_ref();
        debug!(?path, "loading kubeconfig");
        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Err(KubeconfigError::Invalid {
                path: path.to_owned(),
                reason: "empty file".to_string(),
            });
        }
        let raw: Value =
            serde_yaml::from_str(&contents).map_err(|source| KubeconfigError::Load {
                path: path.to_owned(),
                source,
            })?;
        Self::validate(path, &raw)?;
        let mut config: Self =
            serde_yaml::from_value(raw).map_err(|source| KubeconfigError::Load {
                path: path.to_owned(),
                source,
            })?;
        config.path = path.to_owned();
        Ok(config)
    }

    /// Make sure the main fields of a kubeconfig are present
    fn validate(path: &Path, raw: &Value) -> Result<(), KubeconfigError> {
        let invalid = |reason: String| KubeconfigError::Invalid {
            path: path.to_owned(),
            reason,
        };
        let mapping = match raw {
            Value::Null => return Err(invalid("empty file".to_string())),
            Value::Mapping(mapping) => mapping,
            _ => return Err(invalid("expected a mapping at the top level".to_string())),
        };
        for key in ["clusters", "users", "contexts"] {
            match mapping.get(key) {
                None => return Err(invalid(format!("expected key {key} not found"))),
                Some(Value::Sequence(_)) => {}
                Some(other) => {
                    return Err(invalid(format!("invalid type for {key}: {other:?}")));
                }
            }
        }
        Ok(())
    }

    /// Load `path`, creating an empty kubeconfig there if it is missing or broken
    #[instrument]
    pub fn load_or_create(path: &Path) -> Result<Self, KubeconfigError> {
        match Self::load_from_file(path) {
            Ok(config) => Ok(config),
            Err(err) => {
                debug!(%err, "unable to load kubeconfig, recreating");
                let config = Self::empty(path);
                config.save_to_file()?;
                Ok(config)
            }
        }
    }

    /// Write to the bound path, readable by the owner only
    pub fn save_to_file(&self) -> Result<(), KubeconfigError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        let mut file = private_file(&self.path)?;
        file.write_all(yaml.as_bytes())?;
        file.sync_all()?;
        debug!(path = ?self.path, "saved kubeconfig");
        Ok(())
    }

    pub fn cluster(&self, name: &str) -> Option<&ClusterEntry> {
        self.clusters
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.cluster)
    }

    pub fn user(&self, name: &str) -> Option<&UserEntry> {
        self.users.iter().find(|u| u.name == name).map(|u| &u.user)
    }

    pub fn context(&self, name: &str) -> Option<&ContextEntry> {
        self.contexts
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.context)
    }

    pub fn set_cluster(&mut self, entry: NamedCluster) {
        upsert(&mut self.clusters, entry, |c| &c.name);
    }

    pub fn set_user(&mut self, entry: NamedUser) {
        upsert(&mut self.users, entry, |u| &u.name);
    }

    pub fn set_context(&mut self, entry: NamedContext) {
        upsert(&mut self.contexts, entry, |c| &c.name);
    }

    pub fn current_context(&self) -> Option<&str> {
        Some(self.current_context.as_str()).filter(|c| !c.is_empty())
    }

    pub fn set_current_context(&mut self, context: impl Into<String>) {
        self.current_context = context.into();
    }

    /// Remove the cluster, user and context stored under `key`
    pub fn clear(&mut self, key: &str) {
        self.contexts.retain(|c| c.name != key);
        self.clusters.retain(|c| c.name != key);
        self.users.retain(|u| u.name != key);
        if self.current_context == key {
            self.current_context.clear();
        }
    }

    /// Merge `other` into self; entries already in self win
    pub fn merge(&mut self, other: &Kubeconfig) {
        if self.current_context.is_empty() {
            self.current_context = other.current_context.clone();
        }
        for cluster in &other.clusters {
            if self.cluster(&cluster.name).is_none() {
                self.clusters.push(cluster.clone());
            }
        }
        for user in &other.users {
            if self.user(&user.name).is_none() {
                self.users.push(user.clone());
            }
        }
        for context in &other.contexts {
            if self.context(&context.name).is_none() {
                self.contexts.push(context.clone());
            }
        }
    }
}

fn upsert<T>(entries: &mut Vec<T>, entry: T, name: impl Fn(&T) -> &String) {
    match entries.iter_mut().find(|e| name(e) == name(&entry)) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

#[cfg(unix)]
fn private_file(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn private_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Default kubeconfig location the way kubectl resolves it
pub fn default_path(env: &KubeEnv) -> Result<PathBuf, KubeconfigError> {
    if let Some(path) = env.kubeconfig() {
        return Ok(std::path::absolute(&path).unwrap_or(path));
    }
    let home = env.home_dir().ok_or(KubeconfigError::MissingEnvVar(if cfg!(windows) {
        "HOMEDRIVE/HOMEPATH, USERPROFILE, HOME,"
    } else {
        HOME
    }))?;
    Ok(home.join(".kube").join("config"))
}

/// Trust settings for a cluster entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateAuthority {
    Path(PathBuf),
    /// Base64 encoded PEM
    Data(String),
    Insecure,
    /// Rely on the system trust store
    System,
}

pub fn cluster_entry(name: &str, server: &str, ca: CertificateAuthority) -> NamedCluster {
    let mut cluster = ClusterEntry {
        server: Some(server.to_string()),
        ..Default::default()
    };
    match ca {
        CertificateAuthority::Path(path) => {
            cluster.certificate_authority = Some(path.display().to_string())
        }
        CertificateAuthority::Data(data) => cluster.certificate_authority_data = Some(data),
        CertificateAuthority::Insecure => cluster.insecure_skip_tls_verify = Some(true),
        CertificateAuthority::System => {}
    }
    NamedCluster {
        name: name.to_string(),
        cluster,
    }
}

/// Client credential given either inline or as a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Path(PathBuf),
    Data(String),
}

/// Auth provider to configure for a user entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthProvider {
    pub name: String,
    pub cmd_path: Option<String>,
    pub cmd_args: Option<String>,
    pub token_key: Option<String>,
    pub expiry_key: Option<String>,
}

impl AuthProvider {
    pub fn gcp() -> Self {
        Self {
            name: "gcp".to_string(),
            ..Default::default()
        }
    }

    fn customized(&self) -> bool {
        self.cmd_path.is_some()
            || self.cmd_args.is_some()
            || self.token_key.is_some()
            || self.expiry_key.is_some()
    }
}

/// Credentials requested for a user entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAuth {
    pub auth_provider: Option<AuthProvider>,
    pub client_certificate: Option<Credential>,
    pub client_key: Option<Credential>,
    pub impersonate: Option<String>,
}

/// Installation dependent knobs used when generating user entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthOptions {
    /// Emit the exec credential plugin instead of the legacy auth provider
    pub use_exec_plugin: bool,
    pub use_application_default_credentials: bool,
    /// Directory holding `gcloud` and `gke-gcloud-auth-plugin`
    pub sdk_bin_path: Option<PathBuf>,
}

pub fn user_entry(
    name: &str,
    auth: &UserAuth,
    options: &AuthOptions,
) -> Result<NamedUser, KubeconfigError> {
    let has_cert = auth.client_certificate.is_some() && auth.client_key.is_some();
    if auth.auth_provider.is_none() && !has_cert {
        return Err(KubeconfigError::MissingAuth);
    }

    let mut user = UserEntry {
        impersonate: auth.impersonate.clone(),
        ..Default::default()
    };

    if let Some(provider) = &auth.auth_provider {
        if provider.customized() || !options.use_exec_plugin {
            user.auth_provider = Some(auth_provider_entry(provider, options)?);
        } else {
            user.exec = Some(exec_auth_plugin(options));
        }
    }

    match &auth.client_certificate {
        Some(Credential::Path(path)) => user.client_certificate = Some(path.display().to_string()),
        Some(Credential::Data(data)) => user.client_certificate_data = Some(data.clone()),
        None => {}
    }
    match &auth.client_key {
        Some(Credential::Path(path)) => user.client_key = Some(path.display().to_string()),
        Some(Credential::Data(data)) => user.client_key_data = Some(data.clone()),
        None => {}
    }

    Ok(NamedUser {
        name: name.to_string(),
        user,
    })
}

fn auth_provider_entry(
    provider: &AuthProvider,
    options: &AuthOptions,
) -> Result<AuthProviderEntry, KubeconfigError> {
    let mut config = BTreeMap::new();
    if provider.name == "gcp" {
        let cmd_path = match &provider.cmd_path {
            Some(path) => path.clone(),
            None => {
                let bin = if cfg!(windows) { "gcloud.cmd" } else { "gcloud" };
                options
                    .sdk_bin_path
                    .as_ref()
                    .ok_or(KubeconfigError::SdkBinPathNotFound)?
                    .join(bin)
                    .display()
                    .to_string()
            }
        };
        config.insert("cmd-path".to_string(), cmd_path);
        config.insert(
            "cmd-args".to_string(),
            provider
                .cmd_args
                .clone()
                .unwrap_or_else(|| DEFAULT_CMD_ARGS.to_string()),
        );
        config.insert(
            "token-key".to_string(),
            provider
                .token_key
                .clone()
                .unwrap_or_else(|| DEFAULT_TOKEN_KEY.to_string()),
        );
        config.insert(
            "expiry-key".to_string(),
            provider
                .expiry_key
                .clone()
                .unwrap_or_else(|| DEFAULT_EXPIRY_KEY.to_string()),
        );
    }
    Ok(AuthProviderEntry {
        name: provider.name.clone(),
        config,
    })
}

/// Exec plugin entry calling `gke-gcloud-auth-plugin`
pub fn exec_auth_plugin(options: &AuthOptions) -> ExecConfig {
    let bin = if cfg!(windows) {
        "gke-gcloud-auth-plugin.exe"
    } else {
        "gke-gcloud-auth-plugin"
    };
    let command = match &options.sdk_bin_path {
        Some(dir) => dir.join(bin).display().to_string(),
        None => bin.to_string(),
    };
    let args = if options.use_application_default_credentials {
        vec!["--use_application_default_credentials".to_string()]
    } else {
        vec![]
    };
    ExecConfig {
        command,
        api_version: EXEC_AUTH_API_VERSION.to_string(),
        args,
        install_hint: Some(EXEC_AUTH_INSTALL_HINT.to_string()),
        provide_cluster_info: true,
        extra: Extra::new(),
    }
}

pub fn context_entry(name: &str, cluster: &str, user: &str) -> NamedContext {
    NamedContext {
        name: name.to_string(),
        context: ContextEntry {
            cluster: cluster.to_string(),
            user: user.to_string(),
            namespace: None,
            extra: Extra::new(),
        },
    }
}
