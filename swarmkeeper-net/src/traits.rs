//! Collaborator traits and request types
//!
//! The reconciler only ever sees these traits. Production uses the HTTP
//! clients in this crate; tests use [`crate::MockFleet`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use swarmkeeper_core::{ClusterNode, DaemonInfo, Host, JoinTokens, NodeSpec, NodeVersion};

use crate::Result;

/// Registered host directory
#[async_trait::async_trait]
pub trait Inventory: Send + Sync {
    /// List every registered host
    async fn list_hosts(&self) -> Result<Vec<Host>>;

    /// Write back a host record (used for label changes)
    async fn update_host(&self, host: &Host) -> Result<()>;
}

/// Liveness gate for a host's daemon port
#[async_trait::async_trait]
pub trait DaemonProbe: Send + Sync {
    /// Succeeds if the daemon port accepts a connection
    async fn probe(&self, host: &Host) -> Result<()>;
}

/// Opens control connections to daemons
#[async_trait::async_trait]
pub trait DaemonConnector: Send + Sync {
    /// Open a control connection to the host's daemon
    async fn connect(&self, host: &Host) -> Result<Arc<dyn DaemonClient>>;
}

/// Control connection to one container daemon
#[async_trait::async_trait]
pub trait DaemonClient: Send + Sync {
    /// Agree on the API version for later calls
    async fn negotiate_version(&self) -> Result<()>;

    /// Fetch the daemon's membership snapshot
    async fn info(&self) -> Result<DaemonInfo>;

    /// Initialize a new cluster on this daemon, returning its node ID
    async fn swarm_init(&self, request: &InitRequest) -> Result<String>;

    /// Join this daemon to an existing cluster
    async fn swarm_join(&self, request: &JoinRequest) -> Result<()>;

    /// Read cluster-wide settings (manager only)
    async fn swarm_inspect(&self) -> Result<SwarmInspect>;

    /// Create a network (manager only for overlay networks)
    async fn network_create(&self, name: &str, options: &NetworkOptions)
        -> Result<NetworkCreated>;

    /// List cluster nodes (manager only)
    async fn node_list(&self) -> Result<Vec<ClusterNode>>;

    /// Inspect one cluster node (manager only)
    async fn node_inspect(&self, id: &str) -> Result<ClusterNode>;

    /// Replace a node's spec at the given version (manager only)
    async fn node_update(&self, id: &str, version: NodeVersion, spec: &NodeSpec) -> Result<()>;

    /// Remove a node from the cluster (manager only)
    async fn node_remove(&self, id: &str, force: bool) -> Result<()>;

    /// Release the connection; later calls fail with [`crate::Error::Closed`]
    fn close(&self);
}

/// Parameters for initializing a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitRequest {
    pub listen_addr: String,
    pub advertise_addr: String,
}

/// Parameters for joining a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JoinRequest {
    pub listen_addr: String,
    pub advertise_addr: String,
    pub remote_addrs: Vec<String>,
    pub join_token: String,
}

/// Cluster-wide settings read from a manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SwarmInspect {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "JoinTokens", default)]
    pub join_tokens: JoinTokens,
}

/// IPAM settings for a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipam {
    #[serde(rename = "Driver")]
    pub driver: String,
}

/// Options for creating a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkOptions {
    pub check_duplicate: bool,
    pub driver: String,
    #[serde(rename = "EnableIPv6")]
    pub enable_ipv6: bool,
    #[serde(rename = "IPAM")]
    pub ipam: Ipam,
    pub internal: bool,
    pub attachable: bool,
    pub ingress: bool,
}

impl NetworkOptions {
    /// Attachable overlay network with default IPAM
    pub fn overlay() -> Self {
        Self {
            check_duplicate: true,
            driver: "overlay".to_string(),
            enable_ipv6: false,
            ipam: Ipam {
                driver: "default".to_string(),
            },
            internal: false,
            attachable: true,
            ingress: false,
        }
    }
}

/// Result of a network creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NetworkCreated {
    #[serde(rename = "Id", default)]
    pub id: String,
    #[serde(rename = "Warning", default)]
    pub warning: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_options_serialize_engine_names() {
        let json = serde_json::to_value(NetworkOptions::overlay()).unwrap();
        assert_eq!(json["Driver"], "overlay");
        assert_eq!(json["Attachable"], true);
        assert_eq!(json["EnableIPv6"], false);
        assert_eq!(json["IPAM"]["Driver"], "default");
        assert_eq!(json["CheckDuplicate"], true);
    }

    #[test]
    fn join_request_uses_pascal_case() {
        let request = JoinRequest {
            listen_addr: "0.0.0.0:2377".into(),
            advertise_addr: "10.0.0.4".into(),
            remote_addrs: vec!["10.0.0.1:2377".into()],
            join_token: "SWMTKN-1-abc".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["ListenAddr"], "0.0.0.0:2377");
        assert_eq!(json["RemoteAddrs"][0], "10.0.0.1:2377");
        assert_eq!(json["JoinToken"], "SWMTKN-1-abc");
    }

    #[test]
    fn swarm_inspect_reads_join_tokens() {
        let json = r#"{"ID": "c1", "JoinTokens": {"Worker": "w", "Manager": "m"}, "Spec": {}}"#;
        let inspect: SwarmInspect = serde_json::from_str(json).unwrap();
        assert_eq!(inspect.id, "c1");
        assert_eq!(inspect.join_tokens.manager, "m");
        assert_eq!(inspect.join_tokens.worker, "w");
    }
}
