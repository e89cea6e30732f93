//! Mock fleet for testing
//!
//! [`MockFleet`] simulates an inventory, a set of daemons, and the cluster
//! they form. Cluster operations change the simulated state the way a real
//! cluster would (init makes a manager, joins add nodes, role updates flip
//! control capability), so consecutive cycles converge. Every call is
//! recorded in order as a [`Call`].

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use swarmkeeper_core::{
    ClusterNode, DaemonInfo, Host, JoinTokens, LocalNodeState, NodeRole, NodeSpec, NodeVersion,
};

use crate::traits::{
    DaemonClient, DaemonConnector, DaemonProbe, InitRequest, Inventory, JoinRequest,
    NetworkCreated, NetworkOptions, SwarmInspect,
};
use crate::{Error, Result};

const MANAGER_TOKEN: &str = "SWMTKN-mock-manager";
const WORKER_TOKEN: &str = "SWMTKN-mock-worker";

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    Negotiate,
    Info,
    Init,
    Join,
    Inspect,
    NetworkCreate,
    NodeList,
    NodeInspect,
    NodeUpdate,
    NodeRemove,
    UpdateHost,
}

/// A recorded collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListHosts,
    UpdateHost { host: String, manager_label: bool },
    Probe { host: String },
    Connect { host: String },
    Info { host: String },
    Init { host: String },
    Join { host: String, role: Option<NodeRole> },
    Inspect { host: String },
    NetworkCreate { host: String, name: String },
    NodeList { host: String },
    NodeInspect { via: String, node: String },
    NodeUpdate { via: String, node: String, role: NodeRole },
    NodeRemove { via: String, node: String, force: bool },
    Close { host: String },
}

#[derive(Debug, Default)]
struct ClusterState {
    id: String,
    nodes: Vec<ClusterNode>,
    networks: HashSet<String>,
}

#[derive(Debug, Default)]
struct FleetState {
    hosts: Vec<Host>,
    daemons: BTreeMap<String, DaemonInfo>,
    cluster: Option<ClusterState>,
    calls: Vec<Call>,
    failing: HashSet<(String, Op)>,
    unreachable: HashSet<String>,
    inventory_down: bool,
    next_node: u64,
}

impl FleetState {
    fn check(&self, host: &str, op: Op) -> Result<()> {
        if self.failing.contains(&(host.to_string(), op)) {
            return Err(Error::Status {
                status: 500,
                message: format!("injected {op:?} failure on {host}"),
            });
        }
        Ok(())
    }

    fn host(&self, id: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.id == id)
    }

    fn host_id_by_addr(&self, addr: &str) -> Option<String> {
        self.hosts
            .iter()
            .find(|h| h.agent_ip_address == addr)
            .map(|h| h.id.clone())
    }

    fn new_node_id(&mut self) -> String {
        self.next_node += 1;
        format!("node-{}", self.next_node)
    }

    fn require_manager(&self, host: &str) -> Result<()> {
        match self.daemons.get(host) {
            Some(info) if info.is_active_manager() => Ok(()),
            _ => Err(Error::Status {
                status: 503,
                message: format!("{host} is not a manager"),
            }),
        }
    }

    fn cluster_mut(&mut self) -> Result<&mut ClusterState> {
        self.cluster.as_mut().ok_or_else(|| Error::Status {
            status: 503,
            message: "no cluster".to_string(),
        })
    }

    fn manager_addrs(&self, port: u16) -> Vec<String> {
        self.daemons
            .iter()
            .filter(|(_, info)| info.is_active_manager())
            .filter_map(|(id, _)| self.host(id))
            .map(|h| format!("{}:{}", h.agent_ip_address, port))
            .collect()
    }

    fn refresh_remote_managers(&mut self) {
        let addrs = self.manager_addrs(2377);
        for info in self.daemons.values_mut() {
            if info.is_active_manager() {
                info.remote_managers = addrs.clone();
            }
        }
    }

    fn add_member(&mut self, host_id: &str, role: NodeRole, node_id: String) {
        let cluster_id = self.cluster.as_ref().map(|c| c.id.clone()).unwrap_or_default();
        let addr = self
            .host(host_id)
            .map(|h| h.agent_ip_address.clone())
            .unwrap_or_default();
        let info = match role {
            NodeRole::Manager => DaemonInfo::manager(node_id.clone(), cluster_id, vec![]),
            NodeRole::Worker => DaemonInfo::worker(node_id.clone(), cluster_id),
        };
        self.daemons.insert(host_id.to_string(), info);
        if let Some(cluster) = self.cluster.as_mut() {
            cluster.nodes.push(ClusterNode::new(node_id, role, addr));
        }
        self.refresh_remote_managers();
    }
}

/// Simulated inventory, daemons, and cluster
#[derive(Debug, Clone, Default)]
pub struct MockFleet {
    state: Arc<Mutex<FleetState>>,
    closed: Arc<Mutex<Vec<String>>>,
}

impl MockFleet {
    /// Create an empty fleet
    pub fn new() -> Self {
        Self::default()
    }

    /// Fleet of `count` registered, reachable, inactive hosts
    pub fn inactive(count: usize) -> Self {
        Self::with_topology(0, 0, count)
    }

    /// Fleet with an existing cluster of `managers` and `workers` plus
    /// `inactive` hosts waiting to join; hosts are numbered from 1 in that order
    pub fn with_topology(managers: usize, workers: usize, inactive: usize) -> Self {
        let fleet = Self::new();
        let mut index = 0;
        for _ in 0..managers {
            index += 1;
            fleet.add_member(Self::numbered(index), NodeRole::Manager);
        }
        for _ in 0..workers {
            index += 1;
            fleet.add_member(Self::numbered(index), NodeRole::Worker);
        }
        for _ in 0..inactive {
            index += 1;
            fleet.add_host(Self::numbered(index), DaemonInfo::inactive());
        }
        fleet
    }

    /// Host number `i`: id `1h{i}`, hostname `node-{i}`, address `10.0.0.{i}`
    pub fn numbered(i: usize) -> Host {
        Host::new(format!("1h{i}"), format!("node-{i}"), format!("10.0.0.{i}"))
    }

    fn lock(&self) -> MutexGuard<'_, FleetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a host whose daemon reports `info` verbatim
    pub fn add_host(&self, host: Host, info: DaemonInfo) -> &Self {
        let mut state = self.lock();
        state.daemons.insert(host.id.clone(), info);
        state.hosts.push(host);
        self
    }

    /// Register a host that is already a cluster member in `role`
    pub fn add_member(&self, host: Host, role: NodeRole) -> &Self {
        let mut state = self.lock();
        let host_id = host.id.clone();
        state.hosts.push(host);
        if state.cluster.is_none() {
            state.cluster = Some(ClusterState {
                id: "cluster-1".to_string(),
                ..ClusterState::default()
            });
        }
        let node_id = state.new_node_id();
        state.add_member(&host_id, role, node_id);
        self
    }

    /// Track a cluster node that has no registered host
    pub fn add_orphan(&self, node: ClusterNode) -> &Self {
        let mut state = self.lock();
        if let Some(cluster) = state.cluster.as_mut() {
            cluster.nodes.push(node);
        }
        self
    }

    /// Override what a host's daemon reports
    pub fn set_info(&self, host_id: &str, info: DaemonInfo) -> &Self {
        self.lock().daemons.insert(host_id.to_string(), info);
        self
    }

    /// Make a host's daemon port refuse connections
    pub fn set_unreachable(&self, host_id: &str) -> &Self {
        self.lock().unreachable.insert(host_id.to_string());
        self
    }

    /// Make `op` fail on a host (for node operations: the manager serving it)
    pub fn fail(&self, host_id: &str, op: Op) -> &Self {
        self.lock().failing.insert((host_id.to_string(), op));
        self
    }

    /// Make the inventory unavailable
    pub fn set_inventory_down(&self) -> &Self {
        self.lock().inventory_down = true;
        self
    }

    /// Every recorded call, in order
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Recorded calls matching a predicate
    pub fn calls_where(&self, f: impl Fn(&Call) -> bool) -> Vec<Call> {
        self.lock().calls.iter().filter(|c| f(c)).cloned().collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Current inventory record for a host
    pub fn host(&self, host_id: &str) -> Option<Host> {
        self.lock().host(host_id).cloned()
    }

    /// What a host's daemon currently reports
    pub fn info(&self, host_id: &str) -> Option<DaemonInfo> {
        self.lock().daemons.get(host_id).cloned()
    }

    /// Nodes the simulated cluster tracks
    pub fn cluster_nodes(&self) -> Vec<ClusterNode> {
        self.lock()
            .cluster
            .as_ref()
            .map(|c| c.nodes.clone())
            .unwrap_or_default()
    }

    /// Networks created in the simulated cluster
    pub fn networks(&self) -> Vec<String> {
        let mut networks: Vec<String> = self
            .lock()
            .cluster
            .as_ref()
            .map(|c| c.networks.iter().cloned().collect())
            .unwrap_or_default();
        networks.sort();
        networks
    }

    /// Count of hosts whose daemon is an active manager / worker
    pub fn topology(&self) -> (usize, usize) {
        let state = self.lock();
        let managers = state.daemons.values().filter(|i| i.is_active_manager()).count();
        let workers = state.daemons.values().filter(|i| i.is_active_worker()).count();
        (managers, workers)
    }

    /// Host IDs whose connection was closed, in close order
    pub fn closed_connections(&self) -> Vec<String> {
        self.closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Host IDs a connection was opened to
    pub fn opened_connections(&self) -> Vec<String> {
        self.calls_where(|c| matches!(c, Call::Connect { .. }))
            .into_iter()
            .filter_map(|c| match c {
                Call::Connect { host } => Some(host),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Inventory for MockFleet {
    async fn list_hosts(&self) -> Result<Vec<Host>> {
        let mut state = self.lock();
        state.calls.push(Call::ListHosts);
        if state.inventory_down {
            return Err(Error::ConnectionFailed {
                address: "inventory".to_string(),
                reason: "inventory down".to_string(),
            });
        }
        Ok(state.hosts.clone())
    }

    async fn update_host(&self, host: &Host) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::UpdateHost {
            host: host.id.clone(),
            manager_label: host.is_labeled_manager(),
        });
        state.check(&host.id, Op::UpdateHost)?;
        match state.hosts.iter_mut().find(|h| h.id == host.id) {
            Some(existing) => {
                *existing = host.clone();
                Ok(())
            }
            None => Err(Error::NotFound(host.id.clone())),
        }
    }
}

#[async_trait::async_trait]
impl DaemonProbe for MockFleet {
    async fn probe(&self, host: &Host) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Probe {
            host: host.id.clone(),
        });
        if state.unreachable.contains(&host.id) || !state.daemons.contains_key(&host.id) {
            return Err(Error::ConnectionFailed {
                address: host.daemon_address(2375),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DaemonConnector for MockFleet {
    async fn connect(&self, host: &Host) -> Result<Arc<dyn DaemonClient>> {
        let mut state = self.lock();
        state.calls.push(Call::Connect {
            host: host.id.clone(),
        });
        state.check(&host.id, Op::Connect)?;
        Ok(Arc::new(MockDaemon {
            host_id: host.id.clone(),
            state: Arc::clone(&self.state),
            closed_log: Arc::clone(&self.closed),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A connection to one simulated daemon
#[derive(Debug)]
struct MockDaemon {
    host_id: String,
    state: Arc<Mutex<FleetState>>,
    closed_log: Arc<Mutex<Vec<String>>>,
    closed: AtomicBool,
}

impl MockDaemon {
    fn lock(&self) -> Result<MutexGuard<'_, FleetState>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn host(&self) -> String {
        self.host_id.clone()
    }
}

#[async_trait::async_trait]
impl DaemonClient for MockDaemon {
    async fn negotiate_version(&self) -> Result<()> {
        self.lock()?.check(&self.host_id, Op::Negotiate)
    }

    async fn info(&self) -> Result<DaemonInfo> {
        let mut state = self.lock()?;
        state.calls.push(Call::Info { host: self.host() });
        state.check(&self.host_id, Op::Info)?;
        state
            .daemons
            .get(&self.host_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(self.host()))
    }

    async fn swarm_init(&self, _request: &InitRequest) -> Result<String> {
        let mut state = self.lock()?;
        state.calls.push(Call::Init { host: self.host() });
        state.check(&self.host_id, Op::Init)?;
        if state.cluster.is_some() {
            return Err(Error::Status {
                status: 503,
                message: "cluster already initialized".to_string(),
            });
        }
        state.cluster = Some(ClusterState {
            id: "cluster-1".to_string(),
            ..ClusterState::default()
        });
        let node_id = state.new_node_id();
        state.add_member(&self.host_id, NodeRole::Manager, node_id.clone());
        Ok(node_id)
    }

    async fn swarm_join(&self, request: &JoinRequest) -> Result<()> {
        let mut state = self.lock()?;
        let role = match request.join_token.as_str() {
            MANAGER_TOKEN => Some(NodeRole::Manager),
            WORKER_TOKEN => Some(NodeRole::Worker),
            _ => None,
        };
        state.calls.push(Call::Join {
            host: self.host(),
            role,
        });
        state.check(&self.host_id, Op::Join)?;
        let Some(role) = role else {
            return Err(Error::Status {
                status: 400,
                message: "invalid join token".to_string(),
            });
        };
        if state.cluster.is_none() || request.remote_addrs.is_empty() {
            return Err(Error::Status {
                status: 503,
                message: "no manager to join".to_string(),
            });
        }
        let node_id = state.new_node_id();
        state.add_member(&self.host_id, role, node_id);
        Ok(())
    }

    async fn swarm_inspect(&self) -> Result<SwarmInspect> {
        let mut state = self.lock()?;
        state.calls.push(Call::Inspect { host: self.host() });
        state.check(&self.host_id, Op::Inspect)?;
        state.require_manager(&self.host_id)?;
        let id = state.cluster_mut()?.id.clone();
        Ok(SwarmInspect {
            id,
            join_tokens: JoinTokens {
                manager: MANAGER_TOKEN.to_string(),
                worker: WORKER_TOKEN.to_string(),
            },
        })
    }

    async fn network_create(
        &self,
        name: &str,
        _options: &NetworkOptions,
    ) -> Result<NetworkCreated> {
        let mut state = self.lock()?;
        state.calls.push(Call::NetworkCreate {
            host: self.host(),
            name: name.to_string(),
        });
        state.check(&self.host_id, Op::NetworkCreate)?;
        state.require_manager(&self.host_id)?;
        let cluster = state.cluster_mut()?;
        if !cluster.networks.insert(name.to_string()) {
            return Err(Error::Conflict(format!("network with name {name} already exists")));
        }
        Ok(NetworkCreated {
            id: format!("net-{name}"),
            warning: String::new(),
        })
    }

    async fn node_list(&self) -> Result<Vec<ClusterNode>> {
        let mut state = self.lock()?;
        state.calls.push(Call::NodeList { host: self.host() });
        state.check(&self.host_id, Op::NodeList)?;
        state.require_manager(&self.host_id)?;
        Ok(state.cluster_mut()?.nodes.clone())
    }

    async fn node_inspect(&self, id: &str) -> Result<ClusterNode> {
        let mut state = self.lock()?;
        state.calls.push(Call::NodeInspect {
            via: self.host(),
            node: id.to_string(),
        });
        state.check(&self.host_id, Op::NodeInspect)?;
        state.require_manager(&self.host_id)?;
        state
            .cluster_mut()?
            .nodes
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn node_update(&self, id: &str, version: NodeVersion, spec: &NodeSpec) -> Result<()> {
        let mut state = self.lock()?;
        state.calls.push(Call::NodeUpdate {
            via: self.host(),
            node: id.to_string(),
            role: spec.role,
        });
        state.check(&self.host_id, Op::NodeUpdate)?;
        state.require_manager(&self.host_id)?;
        let node = state
            .cluster_mut()?
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if node.version != version {
            return Err(Error::Status {
                status: 500,
                message: "update out of sequence".to_string(),
            });
        }
        node.spec = spec.clone();
        node.version.index += 1;
        let addr = node.status.addr.clone();

        if let Some(host_id) = state.host_id_by_addr(&addr) {
            if let Some(info) = state.daemons.get_mut(&host_id) {
                if info.local_node_state == LocalNodeState::Active {
                    info.control_available = spec.role == NodeRole::Manager;
                    if !info.control_available {
                        info.remote_managers.clear();
                    }
                }
            }
        }
        state.refresh_remote_managers();
        Ok(())
    }

    async fn node_remove(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.lock()?;
        state.calls.push(Call::NodeRemove {
            via: self.host(),
            node: id.to_string(),
            force,
        });
        state.check(&self.host_id, Op::NodeRemove)?;
        state.require_manager(&self.host_id)?;
        let cluster = state.cluster_mut()?;
        let position = cluster
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if cluster.nodes[position].role() == NodeRole::Manager {
            return Err(Error::Status {
                status: 400,
                message: format!("node {id} is a cluster manager; demote it first"),
            });
        }
        cluster.nodes.remove(position);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .calls
                .push(Call::Close { host: self.host() });
            self.closed_log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(self.host());
        }
    }
}
