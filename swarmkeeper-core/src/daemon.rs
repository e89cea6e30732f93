//! Daemon-side view of cluster membership
//!
//! [`DaemonInfo`] is the per-host, per-cycle snapshot taken from a reachable
//! daemon. [`ClusterNode`] and [`NodeSpec`] mirror the node objects a manager
//! reports and accepts back on role updates; they deserialize straight from
//! the engine API's JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Membership state a daemon reports for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalNodeState {
    /// Not part of any cluster
    #[serde(alias = "")]
    Inactive,
    /// Join in progress
    Pending,
    /// Member of a cluster
    Active,
    /// Faulted
    Error,
    /// Cluster is locked and needs an unlock key
    Locked,
}

impl LocalNodeState {
    /// All states, in reporting order
    pub const ALL: [LocalNodeState; 5] = [
        LocalNodeState::Inactive,
        LocalNodeState::Pending,
        LocalNodeState::Active,
        LocalNodeState::Error,
        LocalNodeState::Locked,
    ];

    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            LocalNodeState::Inactive => "inactive",
            LocalNodeState::Pending => "pending",
            LocalNodeState::Active => "active",
            LocalNodeState::Error => "error",
            LocalNodeState::Locked => "locked",
        }
    }
}

impl fmt::Display for LocalNodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one daemon's membership, valid for a single cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonInfo {
    /// Cluster node ID of this daemon (empty when inactive)
    pub node_id: String,
    /// Local membership state
    pub local_node_state: LocalNodeState,
    /// Whether the daemon has manager-control capability
    pub control_available: bool,
    /// Cluster the daemon believes it belongs to
    pub cluster_id: Option<String>,
    /// Manager addresses the daemon can see
    pub remote_managers: Vec<String>,
}

impl DaemonInfo {
    /// Info for a daemon outside any cluster
    pub fn inactive() -> Self {
        Self {
            node_id: String::new(),
            local_node_state: LocalNodeState::Inactive,
            control_available: false,
            cluster_id: None,
            remote_managers: Vec::new(),
        }
    }

    /// Info for an active manager
    pub fn manager(
        node_id: impl Into<String>,
        cluster_id: impl Into<String>,
        remote_managers: Vec<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            local_node_state: LocalNodeState::Active,
            control_available: true,
            cluster_id: Some(cluster_id.into()),
            remote_managers,
        }
    }

    /// Info for an active worker
    pub fn worker(node_id: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            local_node_state: LocalNodeState::Active,
            control_available: false,
            cluster_id: Some(cluster_id.into()),
            remote_managers: Vec::new(),
        }
    }

    /// Info with an arbitrary state and no cluster identity
    pub fn with_state(state: LocalNodeState) -> Self {
        Self {
            local_node_state: state,
            ..Self::inactive()
        }
    }

    /// Cluster identity, treating an empty string as none
    pub fn cluster(&self) -> Option<&str> {
        self.cluster_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Active member with control capability
    pub fn is_active_manager(&self) -> bool {
        self.local_node_state == LocalNodeState::Active && self.control_available
    }

    /// Active member without control capability
    pub fn is_active_worker(&self) -> bool {
        self.local_node_state == LocalNodeState::Active && !self.control_available
    }
}

/// Role of a node in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Control-plane member counted toward quorum
    Manager,
    /// Runs workloads only
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Manager => f.write_str("manager"),
            NodeRole::Worker => f.write_str("worker"),
        }
    }
}

/// Version index used for optimistic concurrency on node updates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVersion {
    #[serde(rename = "Index", default)]
    pub index: u64,
}

/// Desired configuration of a cluster node
///
/// Fields this crate does not interpret are kept in `extra` so an update
/// submits them back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "Role")]
    pub role: NodeRole,
    #[serde(rename = "Availability", default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    #[serde(rename = "Labels", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NodeSpec {
    /// Spec with only a role set
    pub fn with_role(role: NodeRole) -> Self {
        Self {
            role,
            availability: None,
            labels: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// Observed status of a cluster node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Addr", default)]
    pub addr: String,
}

/// A node as tracked by the cluster's managers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Version", default)]
    pub version: NodeVersion,
    #[serde(rename = "Spec")]
    pub spec: NodeSpec,
    #[serde(rename = "Status", default)]
    pub status: NodeStatus,
}

impl ClusterNode {
    /// Node with the given role reporting from `addr`
    pub fn new(id: impl Into<String>, role: NodeRole, addr: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: NodeVersion::default(),
            spec: NodeSpec::with_role(role),
            status: NodeStatus {
                state: "ready".to_string(),
                addr: addr.into(),
            },
        }
    }

    /// Role from the node's spec
    pub fn role(&self) -> NodeRole {
        self.spec.role
    }

    /// Address the node reports from
    pub fn addr(&self) -> &str {
        &self.status.addr
    }
}

/// Credentials for joining the cluster in either role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTokens {
    #[serde(rename = "Manager", default)]
    pub manager: String,
    #[serde(rename = "Worker", default)]
    pub worker: String,
}

impl JoinTokens {
    /// Token for the requested role
    pub fn for_role(&self, role: NodeRole) -> &str {
        match role {
            NodeRole::Manager => &self.manager,
            NodeRole::Worker => &self.worker,
        }
    }
}
