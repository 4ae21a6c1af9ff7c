use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{ClusterConfigError, KubeconfigError};
use crate::kubeconfig::{
    AuthOptions, AuthProvider, AuthProviderEntry, CertificateAuthority, Credential, ExecConfig,
    Kubeconfig, UserAuth, cluster_entry, context_entry, exec_auth_plugin, user_entry,
};
use crate::settings::Settings;

/// The parts of a GKE `Cluster` resource needed to reach its control plane.
///
/// Deserializes from the JSON returned by the container API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cluster {
    pub name: String,
    pub zone: String,
    pub location: String,
    pub endpoint: Option<String>,
    pub master_auth: Option<MasterAuth>,
    pub private_cluster_config: Option<PrivateClusterConfig>,
    pub control_plane_endpoints_config: Option<ControlPlaneEndpointsConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MasterAuth {
    pub cluster_ca_certificate: Option<String>,
    pub client_certificate: Option<String>,
    pub client_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivateClusterConfig {
    pub private_endpoint: Option<String>,
    pub private_endpoint_fqdn: Option<String>,
    pub cross_connect_config: Option<CrossConnectConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossConnectConfig {
    pub items: Vec<CrossConnectItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrossConnectItem {
    pub subnetwork: String,
    pub private_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlPlaneEndpointsConfig {
    pub dns_endpoint_config: Option<DnsEndpointConfig>,
    pub ip_endpoints_config: Option<IpEndpointsConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsEndpointConfig {
    pub endpoint: Option<String>,
    pub allow_external_traffic: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpEndpointsConfig {
    pub enabled: Option<bool>,
}

impl Cluster {
    /// Zone or region the cluster lives in
    pub fn zone_id(&self) -> &str {
        if self.zone.is_empty() {
            &self.location
        } else {
            &self.zone
        }
    }

    fn ip_endpoints_disabled(&self) -> bool {
        self.control_plane_endpoints_config
            .as_ref()
            .and_then(|c| c.ip_endpoints_config.as_ref())
            .is_some_and(|ip| !ip.enabled.unwrap_or(false))
    }

    fn external_dns_traffic_disabled(&self) -> bool {
        self.control_plane_endpoints_config
            .as_ref()
            .and_then(|c| c.dns_endpoint_config.as_ref())
            .is_some_and(|dns| !dns.allow_external_traffic.unwrap_or(false))
    }

    fn dns_endpoint(&self) -> Result<String, ClusterConfigError> {
        self.control_plane_endpoints_config
            .as_ref()
            .and_then(|c| c.dns_endpoint_config.as_ref())
            .and_then(|dns| dns.endpoint.clone())
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| ClusterConfigError::MissingDnsEndpointConfig(self.name.clone()))
    }
}

/// Which control plane address to write into the kubeconfig
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointOptions {
    pub use_internal_ip: bool,
    pub cross_connect_subnetwork: Option<String>,
    pub use_private_fqdn: bool,
    pub use_dns_endpoint: bool,
}

impl EndpointOptions {
    fn wants_private(&self) -> bool {
        self.use_internal_ip || self.cross_connect_subnetwork.is_some() || self.use_private_fqdn
    }
}

/// Options accepted by [`ClusterConfig::persist`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistOptions {
    pub endpoint: EndpointOptions,
    pub impersonate_service_account: Option<String>,
    /// Use this context name instead of `gke_{project}_{zone}_{cluster}`
    pub kubecontext_override: Option<String>,
}

/// Host (without scheme) of the control plane endpoint to use
pub fn cluster_endpoint(
    cluster: &Cluster,
    options: &EndpointOptions,
) -> Result<String, ClusterConfigError> {
    if cluster.ip_endpoints_disabled() && options.wants_private() {
        return Err(ClusterConfigError::IpEndpointsDisabled(cluster.name.clone()));
    }

    if options.use_dns_endpoint && cluster.external_dns_traffic_disabled() {
        return Err(ClusterConfigError::AllowExternalTrafficDisabled(
            cluster.name.clone(),
        ));
    }

    if options.use_dns_endpoint || cluster.ip_endpoints_disabled() {
        return cluster.dns_endpoint();
    }

    if options.wants_private() {
        let private = cluster
            .private_cluster_config
            .as_ref()
            .ok_or_else(|| ClusterConfigError::NonPrivateCluster(cluster.name.clone()))?;
        let private_endpoint = private
            .private_endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ClusterConfigError::MissingPrivateEndpoint(cluster.name.clone()))?;

        if let Some(subnetwork) = &options.cross_connect_subnetwork {
            return private
                .cross_connect_config
                .iter()
                .flat_map(|c| c.items.iter())
                .find(|item| &item.subnetwork == subnetwork)
                .and_then(|item| item.private_endpoint.clone())
                .ok_or_else(|| ClusterConfigError::MissingCrossConnect {
                    cluster: cluster.name.clone(),
                    subnetwork: subnetwork.clone(),
                });
        }
        if options.use_private_fqdn {
            return private
                .private_endpoint_fqdn
                .clone()
                .ok_or_else(|| ClusterConfigError::MissingPrivateFqdn(cluster.name.clone()));
        }
        return Ok(private_endpoint);
    }

    cluster
        .endpoint
        .clone()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ClusterConfigError::MissingEndpoint(cluster.name.clone()))
}

/// How kubectl authenticates to the cluster
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterAuth {
    /// Legacy auth provider, e.g. `gcp`
    AuthProvider(AuthProviderEntry),
    /// Client-go credential plugin
    Exec(ExecConfig),
    ClientCertificate { cert_data: String, key_data: String },
}

/// Credentials of one cluster as stored in the kubeconfig
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub zone_id: String,
    pub project_id: String,
    pub server: String,
    pub auth: ClusterAuth,
    pub ca_data: Option<String>,
    pub dns_endpoint: Option<String>,
    pub impersonate_service_account: Option<String>,
    pub kubecontext_override: Option<String>,
}

impl fmt::Display for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClusterConfig{{project:{}, cluster:{}, zone:{}}}",
            self.project_id, self.cluster_name, self.zone_id
        )
    }
}

/// Per-cluster directory under `base`
pub fn get_config_dir(cluster_name: &str, zone_id: &str, project_id: &str, base: &Path) -> PathBuf {
    base.join(format!("{project_id}_{zone_id}_{cluster_name}"))
}

/// Kubeconfig key for a cluster; the same key names the cluster, user and context
pub fn kube_context(
    cluster_name: &str,
    zone_id: &str,
    project_id: &str,
    kubecontext_override: Option<&str>,
) -> String {
    match kubecontext_override.filter(|o| !o.is_empty()) {
        Some(context) => context.to_string(),
        None => format!("gke_{project_id}_{zone_id}_{cluster_name}"),
    }
}

static IP_ENDPOINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+").expect("valid ip endpoint pattern")
});

/// Whether `server` contains a dotted IPv4 address
fn uses_ip_endpoint(server: &str) -> bool {
    IP_ENDPOINT.is_match(server)
}

impl ClusterConfig {
    pub fn kube_context(&self) -> String {
        kube_context(
            &self.cluster_name,
            &self.zone_id,
            &self.project_id,
            self.kubecontext_override.as_deref(),
        )
    }

    pub fn config_dir(&self, base: &Path) -> PathBuf {
        get_config_dir(&self.cluster_name, &self.zone_id, &self.project_id, base)
    }

    /// Write cluster, user and context entries for `cluster` into the
    /// kubeconfig at `kubeconfig_path` and make it the current context.
    #[instrument(skip_all, fields(cluster = %cluster.name, project = project_id))]
    pub fn persist(
        cluster: &Cluster,
        project_id: &str,
        options: &PersistOptions,
        settings: &Settings,
        kubeconfig_path: &Path,
    ) -> Result<Self, ClusterConfigError> {
        let endpoint = cluster_endpoint(cluster, &options.endpoint)?;

        let dns_endpoint = (options.endpoint.use_dns_endpoint || cluster.ip_endpoints_disabled())
            .then(|| endpoint.clone());

        let master_auth = cluster.master_auth.clone().unwrap_or_default();
        let ca_data = master_auth
            .cluster_ca_certificate
            .clone()
            .filter(|ca| !ca.is_empty());
        if ca_data.is_none() {
            warn!("Cluster is missing certificate authority data.");
        }

        let auth_options = settings.auth_options();
        let auth = if settings.use_client_certificate {
            match (master_auth.client_certificate, master_auth.client_key) {
                (Some(cert_data), Some(key_data))
                    if !cert_data.is_empty() && !key_data.is_empty() =>
                {
                    ClusterAuth::ClientCertificate {
                        cert_data,
                        key_data,
                    }
                }
                _ => return Err(KubeconfigError::MissingAuth.into()),
            }
        } else if auth_options.use_exec_plugin {
            ClusterAuth::Exec(exec_auth_plugin(&auth_options))
        } else {
            ClusterAuth::AuthProvider(AuthProviderEntry {
                name: "gcp".to_string(),
                config: Default::default(),
            })
        };

        let config = Self {
            cluster_name: cluster.name.clone(),
            zone_id: cluster.zone_id().to_string(),
            project_id: project_id.to_string(),
            server: format!("https://{endpoint}"),
            auth,
            ca_data,
            dns_endpoint,
            impersonate_service_account: options.impersonate_service_account.clone(),
            kubecontext_override: options.kubecontext_override.clone(),
        };
        config.gen_kubeconfig(kubeconfig_path, &auth_options)?;
        Ok(config)
    }

    /// Write this config into the kubeconfig at `path`
    pub fn gen_kubeconfig(&self, path: &Path, options: &AuthOptions) -> Result<(), KubeconfigError> {
        let context = self.kube_context();
        let mut kubeconfig = Kubeconfig::load_or_create(path)?;

        let ca = match (&self.ca_data, &self.dns_endpoint) {
            (Some(data), _) => CertificateAuthority::Data(data.clone()),
            (None, Some(_)) => CertificateAuthority::System,
            (None, None) => CertificateAuthority::Insecure,
        };

        let user = match &self.auth {
            ClusterAuth::AuthProvider(provider) => {
                let mut user = user_entry(
                    &context,
                    &UserAuth {
                        auth_provider: Some(AuthProvider {
                            name: provider.name.clone(),
                            ..Default::default()
                        }),
                        impersonate: self.impersonate_service_account.clone(),
                        ..Default::default()
                    },
                    options,
                )?;
                if !provider.config.is_empty() {
                    if let Some(entry) = user.user.auth_provider.as_mut() {
                        entry.config = provider.config.clone();
                    }
                }
                user
            }
            ClusterAuth::ClientCertificate {
                cert_data,
                key_data,
            } => user_entry(
                &context,
                &UserAuth {
                    client_certificate: Some(Credential::Data(cert_data.clone())),
                    client_key: Some(Credential::Data(key_data.clone())),
                    impersonate: self.impersonate_service_account.clone(),
                    ..Default::default()
                },
                options,
            )?,
            ClusterAuth::Exec(exec) => {
                let mut user = user_entry(
                    &context,
                    &UserAuth {
                        auth_provider: Some(AuthProvider::gcp()),
                        impersonate: self.impersonate_service_account.clone(),
                        ..Default::default()
                    },
                    &AuthOptions {
                        use_exec_plugin: true,
                        ..options.clone()
                    },
                )?;
                user.user.exec = Some(exec.clone());
                user
            }
        };

        kubeconfig.set_context(context_entry(&context, &context, &context));
        kubeconfig.set_user(user);
        kubeconfig.set_cluster(cluster_entry(&context, &self.server, ca));
        kubeconfig.set_current_context(&context);
        kubeconfig.save_to_file()?;

        debug!(path = ?kubeconfig.path(), "saved kubeconfig");
        info!(cluster = %self.cluster_name, %context, "kubeconfig entry generated");
        Ok(())
    }

    /// Read and verify the stored config of a cluster.
    ///
    /// Returns `None` when the entries are missing or incomplete.
    #[instrument(skip(kubeconfig_path))]
    pub fn load(
        cluster_name: &str,
        zone_id: &str,
        project_id: &str,
        kubecontext_override: Option<&str>,
        kubeconfig_path: &Path,
    ) -> Result<Option<Self>, ClusterConfigError> {
        let kubeconfig = Kubeconfig::load_or_create(kubeconfig_path)?;
        let key = kube_context(cluster_name, zone_id, project_id, kubecontext_override);

        let (Some(cluster), Some(user), Some(context)) = (
            kubeconfig.cluster(&key),
            kubeconfig.user(&key),
            kubeconfig.context(&key),
        ) else {
            debug!(%key, "missing kubeconfig entries");
            return Ok(None);
        };
        if context.user != key || context.cluster != key {
            debug!(?context, "invalid context");
            return Ok(None);
        }

        let Some(server) = cluster.server.clone().filter(|s| !s.is_empty()) else {
            debug!(%key, "missing cluster.server entry");
            return Ok(None);
        };
        let insecure = cluster.insecure_skip_tls_verify.unwrap_or(false);
        let ca_data = cluster
            .certificate_authority_data
            .clone()
            .filter(|ca| !ca.is_empty());
        if insecure {
            if ca_data.is_some() {
                debug!(
                    "cluster cannot specify both certificate-authority-data and insecure-skip-tls-verify"
                );
                return Ok(None);
            }
        } else if ca_data.is_none() && uses_ip_endpoint(&server) {
            debug!(
                "cluster must specify one of certificate-authority-data|insecure-skip-tls-verify"
            );
            return Ok(None);
        }

        let auth = if let Some(provider) = &user.auth_provider {
            ClusterAuth::AuthProvider(provider.clone())
        } else if let Some(exec) = &user.exec {
            ClusterAuth::Exec(exec.clone())
        } else if let (Some(cert_data), Some(key_data)) =
            (&user.client_certificate_data, &user.client_key_data)
        {
            ClusterAuth::ClientCertificate {
                cert_data: cert_data.clone(),
                key_data: key_data.clone(),
            }
        } else {
            debug!(%key, "missing auth info for user");
            return Ok(None);
        };

        Ok(Some(Self {
            cluster_name: cluster_name.to_string(),
            zone_id: zone_id.to_string(),
            project_id: project_id.to_string(),
            server,
            auth,
            ca_data,
            dns_endpoint: None,
            impersonate_service_account: user.impersonate.clone(),
            kubecontext_override: kubecontext_override.map(str::to_string),
        }))
    }

    /// Remove the config directory and the kubeconfig entries of a cluster
    #[instrument(skip(config_base, kubeconfig_path))]
    pub fn purge(
        cluster_name: &str,
        zone_id: &str,
        project_id: &str,
        kubecontext_override: Option<&str>,
        config_base: &Path,
        kubeconfig_path: &Path,
    ) -> Result<(), ClusterConfigError> {
        let config_dir = get_config_dir(cluster_name, zone_id, project_id, config_base);
        if config_dir.exists() {
            fs::remove_dir_all(&config_dir)?;
        }
        let mut kubeconfig = Kubeconfig::load_or_create(kubeconfig_path)?;
        kubeconfig.clear(&kube_context(
            cluster_name,
            zone_id,
            project_id,
            kubecontext_override,
        ));
        kubeconfig.save_to_file()?;
        debug!(?config_dir, "purged cluster config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn public_cluster() -> Cluster {
        Cluster {
            name: "prod".to_string(),
            zone: "us-central1-a".to_string(),
            endpoint: Some("34.1.2.3".to_string()),
            master_auth: Some(MasterAuth {
                cluster_ca_certificate: Some("Q0EK".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn private_cluster() -> Cluster {
        Cluster {
            private_cluster_config: Some(PrivateClusterConfig {
                private_endpoint: Some("10.0.0.2".to_string()),
                private_endpoint_fqdn: Some("prod.internal".to_string()),
                cross_connect_config: Some(CrossConnectConfig {
                    items: vec![CrossConnectItem {
                        subnetwork: "projects/p/regions/r/subnetworks/s".to_string(),
                        private_endpoint: Some("10.1.0.2".to_string()),
                    }],
                }),
            }),
            ..public_cluster()
        }
    }

    fn dns_only_cluster() -> Cluster {
        Cluster {
            control_plane_endpoints_config: Some(ControlPlaneEndpointsConfig {
                dns_endpoint_config: Some(DnsEndpointConfig {
                    endpoint: Some("gke-abc.us-central1.gke.goog".to_string()),
                    allow_external_traffic: Some(true),
                }),
                ip_endpoints_config: Some(IpEndpointsConfig {
                    enabled: Some(false),
                }),
            }),
            ..public_cluster()
        }
    }

    #[test]
    fn test_naming() {
        assert_eq!(
            get_config_dir("c", "z", "p", Path::new("/base")),
            PathBuf::from("/base/p_z_c")
        );
        assert_eq!(kube_context("c", "z", "p", None), "gke_p_z_c");
        assert_eq!(kube_context("c", "z", "p", Some("mine")), "mine");
    }

    #[test]
    fn test_endpoint_selection() {
        let public = EndpointOptions::default();
        assert_eq!(cluster_endpoint(&public_cluster(), &public).expect("public"), "34.1.2.3");

        let internal = EndpointOptions {
            use_internal_ip: true,
            ..Default::default()
        };
        assert_eq!(cluster_endpoint(&private_cluster(), &internal).expect("internal"), "10.0.0.2");
        assert!(matches!(
            cluster_endpoint(&public_cluster(), &internal),
            Err(ClusterConfigError::NonPrivateCluster(_))
        ));

        let fqdn = EndpointOptions {
            use_private_fqdn: true,
            ..Default::default()
        };
        assert_eq!(cluster_endpoint(&private_cluster(), &fqdn).expect("fqdn"), "prod.internal");

        let cross = EndpointOptions {
            cross_connect_subnetwork: Some("projects/p/regions/r/subnetworks/s".to_string()),
            ..Default::default()
        };
        assert_eq!(cluster_endpoint(&private_cluster(), &cross).expect("cross"), "10.1.0.2");
        let missing = EndpointOptions {
            cross_connect_subnetwork: Some("other".to_string()),
            ..Default::default()
        };
        let err = cluster_endpoint(&private_cluster(), &missing).expect_err("missing");
        assert_eq!(err.to_string(), "cluster prod is missing cross-connect subnetwork other.");
    }

    #[test]
    fn test_dns_endpoint_rules() {
        assert_eq!(
            cluster_endpoint(&dns_only_cluster(), &EndpointOptions::default()).expect("dns"),
            "gke-abc.us-central1.gke.goog"
        );

        let internal = EndpointOptions {
            use_internal_ip: true,
            ..Default::default()
        };
        assert!(matches!(
            cluster_endpoint(&dns_only_cluster(), &internal),
            Err(ClusterConfigError::IpEndpointsDisabled(_))
        ));

        let mut closed = dns_only_cluster();
        if let Some(dns) = closed
            .control_plane_endpoints_config
            .as_mut()
            .and_then(|c| c.dns_endpoint_config.as_mut())
        {
            dns.allow_external_traffic = Some(false);
        }
        let dns = EndpointOptions {
            use_dns_endpoint: true,
            ..Default::default()
        };
        assert!(matches!(
            cluster_endpoint(&closed, &dns),
            Err(ClusterConfigError::AllowExternalTrafficDisabled(_))
        ));

        let err = cluster_endpoint(&public_cluster(), &dns).expect_err("no dns config");
        assert_eq!(err.to_string(), "cluster prod is missing DNSEndpointConfig.");
    }

    #[test]
    fn test_missing_endpoint() {
        let cluster = Cluster {
            endpoint: None,
            ..public_cluster()
        };
        let err = cluster_endpoint(&cluster, &EndpointOptions::default()).expect_err("missing");
        assert_eq!(
            err.to_string(),
            "cluster prod is missing endpoint. Is it still PROVISIONING?"
        );
    }

    #[test]
    fn test_ip_detection() {
        assert!(uses_ip_endpoint("https://34.1.2.3"));
        assert!(uses_ip_endpoint("https://10.0.0.1:443"));
        assert!(!uses_ip_endpoint("https://gke-abc.gke.goog"));
        assert!(!uses_ip_endpoint("https://1.2.3"));
        assert!(uses_ip_endpoint("10.128.0.2"));
        assert!(!uses_ip_endpoint("https://gke-10-1.example.com"));
    }

    #[test]
    fn test_cluster_from_api_json() {
        let cluster: Cluster = serde_json::from_str(
            r#"{
                "name": "prod",
                "zone": "",
                "location": "us-central1",
                "endpoint": "34.1.2.3",
                "masterAuth": {"clusterCaCertificate": "Q0EK"},
                "status": "RUNNING"
            }"#,
        )
        .expect("parse");
        assert_eq!(cluster.zone_id(), "us-central1");
        assert_eq!(
            cluster.master_auth.and_then(|m| m.cluster_ca_certificate).as_deref(),
            Some("Q0EK")
        );
    }
}
