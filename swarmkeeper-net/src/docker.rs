//! Container-daemon client over the engine HTTP API
//!
//! Paths are unversioned until [`DaemonClient::negotiate_version`] runs; after
//! that every request is prefixed with `/v{version}`, where the version is the
//! lower of the daemon's API version and [`MAX_API_VERSION`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use swarmkeeper_core::{ClusterNode, DaemonInfo, Host, LocalNodeState, NodeSpec, NodeVersion};
use tracing::debug;

use crate::probe::DAEMON_PORT;
use crate::traits::{
    DaemonClient, DaemonConnector, InitRequest, JoinRequest, NetworkCreated, NetworkOptions,
    SwarmInspect,
};
use crate::{Error, Result};

/// Highest engine API version this client speaks
pub const MAX_API_VERSION: &str = "1.41";

#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(rename = "ApiVersion")]
    api_version: String,
}

#[derive(Debug, Default, Deserialize)]
struct InfoResponse {
    #[serde(rename = "Swarm", default)]
    swarm: SwarmInfo,
}

#[derive(Debug, Default, Deserialize)]
struct SwarmInfo {
    #[serde(rename = "NodeID", default)]
    node_id: String,
    #[serde(rename = "LocalNodeState", default)]
    local_node_state: Option<LocalNodeState>,
    #[serde(rename = "ControlAvailable", default)]
    control_available: bool,
    #[serde(rename = "Cluster", default)]
    cluster: Option<ClusterInfo>,
    #[serde(rename = "RemoteManagers", default)]
    remote_managers: Option<Vec<Peer>>,
}

#[derive(Debug, Deserialize)]
struct ClusterInfo {
    #[serde(rename = "ID", default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct Peer {
    #[serde(rename = "Addr", default)]
    addr: String,
}

impl From<SwarmInfo> for DaemonInfo {
    fn from(swarm: SwarmInfo) -> Self {
        DaemonInfo {
            node_id: swarm.node_id,
            local_node_state: swarm.local_node_state.unwrap_or(LocalNodeState::Inactive),
            control_available: swarm.control_available,
            cluster_id: swarm.cluster.map(|c| c.id).filter(|id| !id.is_empty()),
            remote_managers: swarm
                .remote_managers
                .unwrap_or_default()
                .into_iter()
                .map(|p| p.addr)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct NetworkCreateBody<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(flatten)]
    options: &'a NetworkOptions,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Lower of the daemon's version and ours; ours when the daemon's is unparseable
fn negotiated(server: &str) -> String {
    match (parse_version(server), parse_version(MAX_API_VERSION)) {
        (Some(theirs), Some(ours)) if theirs < ours => server.to_string(),
        _ => MAX_API_VERSION.to_string(),
    }
}

/// Engine-API client for one daemon
#[derive(Debug)]
pub struct HttpDaemonClient {
    base: String,
    http: reqwest::Client,
    version: OnceLock<String>,
    closed: AtomicBool,
}

impl HttpDaemonClient {
    /// Client for a daemon at `host:port`
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        if address.is_empty() || address.contains('/') {
            return Err(Error::InvalidAddress(address.to_string()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: format!("http://{address}"),
            http,
            version: OnceLock::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Negotiated API version, if negotiation ran
    pub fn api_version(&self) -> Option<&str> {
        self.version.get().map(String::as_str)
    }

    fn url(&self, path: &str) -> String {
        match self.version.get() {
            Some(v) => format!("{}/v{}{}", self.base, v, path),
            None => format!("{}{}", self.base, path),
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(self.http.request(method, self.url(path)))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                Error::ConnectionFailed {
                    address: self.base.clone(),
                    reason: e.to_string(),
                }
            } else {
                Error::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);
        Err(match status {
            StatusCode::CONFLICT => Error::Conflict(message),
            StatusCode::NOT_FOUND => Error::NotFound(message),
            other => Error::Status {
                status: other.as_u16(),
                message,
            },
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let bytes = self.send(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait::async_trait]
impl DaemonClient for HttpDaemonClient {
    async fn negotiate_version(&self) -> Result<()> {
        if self.version.get().is_some() {
            return Ok(());
        }
        let response: VersionResponse = self.json(self.request(Method::GET, "/version")?).await?;
        let version = negotiated(&response.api_version);
        debug!(daemon = %self.base, server = %response.api_version, %version, "negotiated API version");
        let _ = self.version.set(version);
        Ok(())
    }

    async fn info(&self) -> Result<DaemonInfo> {
        let response: InfoResponse = self.json(self.request(Method::GET, "/info")?).await?;
        Ok(response.swarm.into())
    }

    async fn swarm_init(&self, request: &InitRequest) -> Result<String> {
        self.json(self.request(Method::POST, "/swarm/init")?.json(request))
            .await
    }

    async fn swarm_join(&self, request: &JoinRequest) -> Result<()> {
        self.send(self.request(Method::POST, "/swarm/join")?.json(request))
            .await?;
        Ok(())
    }

    async fn swarm_inspect(&self) -> Result<SwarmInspect> {
        self.json(self.request(Method::GET, "/swarm")?).await
    }

    async fn network_create(
        &self,
        name: &str,
        options: &NetworkOptions,
    ) -> Result<NetworkCreated> {
        let body = NetworkCreateBody { name, options };
        self.json(self.request(Method::POST, "/networks/create")?.json(&body))
            .await
    }

    async fn node_list(&self) -> Result<Vec<ClusterNode>> {
        self.json(self.request(Method::GET, "/nodes")?).await
    }

    async fn node_inspect(&self, id: &str) -> Result<ClusterNode> {
        self.json(self.request(Method::GET, &format!("/nodes/{id}"))?)
            .await
    }

    async fn node_update(&self, id: &str, version: NodeVersion, spec: &NodeSpec) -> Result<()> {
        let path = format!("/nodes/{id}/update?version={}", version.index);
        self.send(self.request(Method::POST, &path)?.json(spec)).await?;
        Ok(())
    }

    async fn node_remove(&self, id: &str, force: bool) -> Result<()> {
        let path = format!("/nodes/{id}?force={force}");
        self.send(self.request(Method::DELETE, &path)?).await?;
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Opens [`HttpDaemonClient`]s on `{agent_ip}:{port}`
#[derive(Debug, Clone)]
pub struct HttpDaemonConnector {
    port: u16,
    timeout: Duration,
}

impl HttpDaemonConnector {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

impl Default for HttpDaemonConnector {
    fn default() -> Self {
        Self::new(DAEMON_PORT, Duration::from_secs(10))
    }
}

#[async_trait::async_trait]
impl DaemonConnector for HttpDaemonConnector {
    async fn connect(&self, host: &Host) -> Result<Arc<dyn DaemonClient>> {
        let client = HttpDaemonClient::new(&host.daemon_address(self.port), self.timeout)?;
        Ok(Arc::new(client))
    }
}
