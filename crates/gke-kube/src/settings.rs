use std::fs::{read_to_string, write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::env::{
    KubeEnv, USE_APPLICATION_DEFAULT_CREDENTIALS, USE_CLIENT_CERTIFICATE,
    USE_GKE_GCLOUD_AUTH_PLUGIN,
};
use crate::error::SettingsError;
use crate::kubectl::DEFAULT_REQUEST_TIMEOUT;
use crate::kubeconfig::AuthOptions;

pub const SETTINGS_DIR: &str = "gke-kube";
pub const SETTINGS_TOML_FILENAME: &str = "settings.toml";
const CONTAINER_CONFIG_DIR: &str = "kubernetes";

/// User preferences stored in `settings.toml`.
///
/// A missing file is the same as an empty one; every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the per-cluster config directories
    pub container_config_path: Option<PathBuf>,
    /// Authenticate with the cluster's client certificate instead of gcloud
    pub use_client_certificate: bool,
    /// Write exec plugin entries instead of the legacy gcp auth provider
    pub use_gke_gcloud_auth_plugin: bool,
    pub use_application_default_credentials: bool,
    pub sdk_bin_path: Option<PathBuf>,
    pub kubectl_request_timeout: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            container_config_path: None,
            use_client_certificate: false,
            use_gke_gcloud_auth_plugin: false,
            use_application_default_credentials: false,
            sdk_bin_path: None,
            kubectl_request_timeout: DEFAULT_REQUEST_TIMEOUT.to_string(),
        }
    }
}

impl Settings {
    fn config_root() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|dir| dir.join(SETTINGS_DIR))
            .ok_or(SettingsError::NoConfigDir)
    }

    pub fn settings_file_path() -> Result<PathBuf, SettingsError> {
        Ok(Self::config_root()?.join(SETTINGS_TOML_FILENAME))
    }

    /// Load from the default location
    pub fn open() -> Result<Self, SettingsError> {
        Self::load_from(Self::settings_file_path()?)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(?path, "no settings file, using defaults");
            return Ok(Self::default());
        }
        let contents = read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write(path, toml::to_string(self)?)?;
        debug!(?path, "saved settings");
        Ok(())
    }

    /// Apply environment overrides on top of the file values
    pub fn with_env(mut self, env: &KubeEnv) -> Self {
        if let Some(value) = env.flag(USE_CLIENT_CERTIFICATE) {
            self.use_client_certificate = value;
        }
        if let Some(value) = env.flag(USE_GKE_GCLOUD_AUTH_PLUGIN) {
            self.use_gke_gcloud_auth_plugin = value;
        }
        if let Some(value) = env.flag(USE_APPLICATION_DEFAULT_CREDENTIALS) {
            self.use_application_default_credentials = value;
        }
        self
    }

    /// Directory under which per-cluster config directories live
    pub fn container_config_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.container_config_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_root()?.join(CONTAINER_CONFIG_DIR)),
        }
    }

    /// Options for generating kubeconfig user entries.
    ///
    /// Without a configured `sdk_bin_path` the directory of `gcloud` on
    /// `PATH` is used, if there is one.
    pub fn auth_options(&self) -> AuthOptions {
        let sdk_bin_path = self.sdk_bin_path.clone().or_else(|| {
            which::which("gcloud")
                .ok()
                .and_then(|path| path.parent().map(Path::to_path_buf))
        });
        AuthOptions {
            use_exec_plugin: self.use_gke_gcloud_auth_plugin,
            use_application_default_credentials: self.use_application_default_credentials,
            sdk_bin_path,
        }
    }
}
