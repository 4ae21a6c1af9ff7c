use std::process::Command;
use std::time::Duration;

use fluvio_command::CommandExt;
use gke_waiter::{Clock, RetryPolicy, SystemClock, TOO_MANY_REQUESTS, retry_on_status};
use serde::Deserialize;
use tracing::{debug, instrument};
use ureq::{Agent, AgentBuilder, OrAnyStatus, Proxy};

use crate::api_error::{ApiError, BAD_REQUEST, FORBIDDEN, reraise};
use crate::cluster_config::Cluster;
use crate::env::{ACCESS_TOKEN, ALL_PROXY, HTTP_PROXY, HTTPS_PROXY, KubeEnv};
use crate::error::ContainerApiError;
use crate::settings::Settings;

pub const CONTAINER_API: &str = "https://container.googleapis.com/v1";
/// Location that matches every zone and region of a project
pub const ALL_LOCATIONS: &str = "-";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Status and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues authenticated GET requests against the container API
pub trait ContainerTransport {
    fn get(&self, url: &str, token: &str) -> Result<HttpResponse, ContainerApiError>;
}

/// Blocking transport backed by ureq
#[derive(Debug)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    /// Agent honoring the proxy variables of `env`
    pub fn from_env(env: &KubeEnv) -> Result<Self, ContainerApiError> {
        let builder = AgentBuilder::new().timeout(REQUEST_TIMEOUT);
        let proxy = [ALL_PROXY, HTTPS_PROXY, HTTP_PROXY]
            .into_iter()
            .find_map(|name| env.get(name).or_else(|| env.get(&name.to_lowercase())));
        let agent = match proxy {
            Some(proxy) => {
                let proxy = Proxy::new(proxy)
                    .map_err(|err| ContainerApiError::Transport(format!("invalid proxy: {err}")))?;
                builder.proxy(proxy).build()
            }
            None => builder.build(),
        };
        Ok(Self { agent })
    }
}

impl ContainerTransport for UreqTransport {
    fn get(&self, url: &str, token: &str) -> Result<HttpResponse, ContainerApiError> {
        let response = self
            .agent
            .get(url)
            .set("Authorization", &format!("Bearer {token}"))
            .call()
            .or_any_status()
            .map_err(|err| ContainerApiError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response
            .into_string()
            .map_err(|err| ContainerApiError::Transport(err.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListClustersResponse {
    clusters: Vec<Cluster>,
}

/// Reads cluster resources from the GKE container API
#[derive(Debug)]
pub struct ContainerClient<T> {
    transport: T,
    token: String,
    endpoint: String,
    retry: RetryPolicy,
}

impl<T: ContainerTransport> ContainerClient<T> {
    pub fn new(transport: T, token: impl Into<String>) -> Self {
        Self {
            transport,
            token: token.into(),
            endpoint: CONTAINER_API.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn cluster_url(&self, project: &str, location: &str, name: &str) -> String {
        format!(
            "{}/projects/{project}/locations/{location}/clusters/{name}",
            self.endpoint
        )
    }

    fn clusters_url(&self, project: &str, location: &str) -> String {
        format!(
            "{}/projects/{project}/locations/{location}/clusters",
            self.endpoint
        )
    }

    /// GET `url`, turning a non-success status into an [`ApiError`]
    fn fetch(&self, url: &str) -> Result<String, ContainerApiError> {
        debug!(%url, "container api request");
        let response = self.transport.get(url, &self.token)?;
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(ApiError::from_http_body(response.status, &response.body).into())
        }
    }

    pub fn get_cluster(
        &self,
        project: &str,
        location: &str,
        name: &str,
    ) -> Result<Cluster, ContainerApiError> {
        self.get_cluster_with_clock(project, location, name, &mut SystemClock::start())
    }

    /// Fetch one cluster.
    ///
    /// When the cluster is not found, every location of the project is
    /// searched so the error can point at the location it actually lives in.
    #[instrument(skip(self, clock))]
    pub fn get_cluster_with_clock<C: Clock>(
        &self,
        project: &str,
        location: &str,
        name: &str,
        clock: &mut C,
    ) -> Result<Cluster, ContainerApiError> {
        let url = self.cluster_url(project, location, name);
        let error = match self.fetch(&url) {
            Ok(body) => return Ok(serde_json::from_str(&body)?),
            Err(ContainerApiError::Api(err)) if err.is_not_found() => err,
            Err(err) => return Err(classify(err)),
        };

        let clusters = self.list_clusters_with_clock(project, None, clock)?;
        match clusters.into_iter().find(|cluster| cluster.name == name) {
            Some(found) => Err(ContainerApiError::WrongZone {
                error,
                name: name.to_string(),
                wrong_zone: location.to_string(),
                zone: found.zone_id().to_string(),
            }),
            None => Err(ContainerApiError::NoSuchCluster {
                error,
                name: name.to_string(),
                project: project.to_string(),
            }),
        }
    }

    pub fn list_clusters(
        &self,
        project: &str,
        location: Option<&str>,
    ) -> Result<Vec<Cluster>, ContainerApiError> {
        self.list_clusters_with_clock(project, location, &mut SystemClock::start())
    }

    /// Clusters of `project` in `location`, or in every location when unset.
    ///
    /// Throttled responses are retried with backoff.
    #[instrument(skip(self, clock))]
    pub fn list_clusters_with_clock<C: Clock>(
        &self,
        project: &str,
        location: Option<&str>,
        clock: &mut C,
    ) -> Result<Vec<Cluster>, ContainerApiError> {
        let url = self.clusters_url(project, location.unwrap_or(ALL_LOCATIONS));
        let body = retry_on_status(TOO_MANY_REQUESTS, &self.retry, clock, || self.fetch(&url))
            .map_err(classify)?;
        let response: ListClustersResponse = serde_json::from_str(&body)?;
        Ok(response.clusters)
    }
}

/// Map client side API errors onto their dedicated variants
fn classify(err: ContainerApiError) -> ContainerApiError {
    match err {
        ContainerApiError::Api(api) => reraise(api, |api| match api.status {
            FORBIDDEN => ContainerApiError::PermissionDenied(api.clone()),
            BAD_REQUEST => ContainerApiError::BadRequest(api.clone()),
            _ => ContainerApiError::NotFound(api.clone()),
        }),
        other => other,
    }
}

/// Bearer token for the container API.
///
/// `CLOUDSDK_AUTH_ACCESS_TOKEN` wins; otherwise `gcloud auth print-access-token`
/// is run from the SDK directory.
pub fn access_token(env: &KubeEnv, settings: &Settings) -> Result<String, ContainerApiError> {
    if let Some(token) = env.get(ACCESS_TOKEN) {
        return Ok(token.to_string());
    }
    let gcloud = settings
        .auth_options()
        .sdk_bin_path
        .map(|dir| dir.join("gcloud"))
        .ok_or(ContainerApiError::MissingGcloud)?;
    let output = Command::new(&gcloud)
        .args(["auth", "print-access-token"])
        .result()
        .map_err(|err| ContainerApiError::AccessToken(err.to_string()))?;
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(ContainerApiError::AccessToken(
            "gcloud printed an empty access token".to_string(),
        ));
    }
    Ok(token)
}
