//! Action executor
//!
//! Applies one [`Decision`] against the cluster. Operations that need "a
//! manager" go through [`first_success`] over the cycle's manager list.
//! Host label updates are advisory: a failed update is logged and the
//! cycle carries on.

use rand::seq::SliceRandom;
use swarmkeeper_core::{ClusterNode, Decision, Host, JoinTokens, NodeRole, WorldView};
use swarmkeeper_net::{InitRequest, Inventory, JoinRequest, NetworkOptions};
use swarmkeeper_runtime::fan_out;
use tracing::{debug, info, warn};

use crate::connections::ConnectionSet;
use crate::failover::first_success;
use crate::{ReconcileConfig, Result};

/// What a joining host needs from the existing cluster
#[derive(Debug, Clone)]
pub struct JoinContext {
    pub tokens: JoinTokens,
    /// Manager addresses to contact when joining
    pub remote_addrs: Vec<String>,
}

/// Applies decisions for one cycle
pub struct Executor<'a> {
    view: &'a WorldView,
    connections: &'a ConnectionSet,
    inventory: &'a dyn Inventory,
    config: &'a ReconcileConfig,
    /// Managers usable this cycle; grows when a cluster is created
    managers: Vec<Host>,
    context: Option<JoinContext>,
}

impl<'a> Executor<'a> {
    pub fn new(
        view: &'a WorldView,
        connections: &'a ConnectionSet,
        inventory: &'a dyn Inventory,
        config: &'a ReconcileConfig,
    ) -> Self {
        Self {
            view,
            connections,
            inventory,
            config,
            managers: view.managers.clone(),
            context: None,
        }
    }

    /// Managers known to this cycle, including one created by `CreateCluster`
    pub fn managers(&self) -> &[Host] {
        &self.managers
    }

    /// Apply one decision
    pub async fn execute(&mut self, decision: &Decision) -> Result<()> {
        if decision.requires_join_tokens() {
            self.join_context().await?;
        }

        match decision {
            Decision::None(_) => Ok(()),
            Decision::CreateCluster => self.create_cluster().await,
            Decision::CreateNetwork => self.create_network().await,
            Decision::AddManager => {
                let context = self.join_context().await?;
                self.add_manager(&context).await
            }
            Decision::AddWorkers => {
                let context = self.join_context().await?;
                self.add_workers(&context).await
            }
            Decision::PromoteWorker => self.promote_worker().await,
            Decision::DemoteManager => self.demote_manager().await,
            Decision::RemoveStaleNodes { orphans } => self.remove_stale_nodes(orphans).await,
        }
    }

    /// Join context for this cycle, fetched on first use
    async fn join_context(&mut self) -> Result<JoinContext> {
        if let Some(context) = &self.context {
            return Ok(context.clone());
        }
        let context = self.fetch_join_context().await?;
        self.context = Some(context.clone());
        Ok(context)
    }

    /// Read join tokens from the first manager that answers
    pub async fn fetch_join_context(&self) -> Result<JoinContext> {
        let (manager, inspect) = first_success("swarm-inspect", &self.managers, |manager| {
            let client = self.connections.client(manager);
            async move { client?.swarm_inspect().await }
        })
        .await?;

        let remote_addrs = self
            .view
            .info
            .get(&manager.id)
            .map(|info| info.remote_managers.clone())
            .filter(|addrs| !addrs.is_empty())
            .unwrap_or_else(|| self.view.manager_addrs.clone());

        debug!(host = %manager.hostname, remotes = ?remote_addrs, "fetched join tokens");
        Ok(JoinContext {
            tokens: inspect.join_tokens,
            remote_addrs,
        })
    }

    async fn create_cluster(&mut self) -> Result<()> {
        let view = self.view;
        let Some(host) = pick(view.inactive(), "create-cluster") else {
            return Ok(());
        };

        let client = self.connections.client(host)?;
        let node_id = client
            .swarm_init(&InitRequest {
                listen_addr: self.config.listen_addr(),
                advertise_addr: host.agent_ip_address.clone(),
            })
            .await?;
        info!(host = %host.hostname, %node_id, "created cluster");

        self.label(host, true).await;
        self.managers.push(host.clone());
        Ok(())
    }

    async fn create_network(&self) -> Result<()> {
        let name = self.config.overlay_network.as_str();
        let options = NetworkOptions::overlay();
        let (manager, created) = first_success("network-create", &self.managers, |manager| {
            let client = self.connections.client(manager);
            let options = &options;
            async move {
                match client?.network_create(name, options).await {
                    Ok(created) => Ok(Some(created)),
                    Err(e) if e.is_conflict() => Ok(None),
                    Err(e) => Err(e),
                }
            }
        })
        .await?;

        match created {
            Some(created) => {
                if !created.warning.is_empty() {
                    warn!(network = name, warning = %created.warning, "network created with warning");
                }
                info!(network = name, id = %created.id, host = %manager.hostname, "created overlay network");
            }
            None => info!(network = name, "overlay network already exists"),
        }
        Ok(())
    }

    async fn add_manager(&self, context: &JoinContext) -> Result<()> {
        let Some(host) = pick(self.view.inactive(), "add-manager") else {
            return Ok(());
        };
        self.join(host, NodeRole::Manager, context).await?;
        info!(host = %host.hostname, "joined as manager");
        self.label(host, true).await;
        Ok(())
    }

    async fn add_workers(&self, context: &JoinContext) -> Result<()> {
        let inactive = self.view.inactive();
        let results = fan_out(inactive, |host| async move {
            (host, self.join(host, NodeRole::Worker, context).await)
        })
        .await;

        let mut joined = 0;
        for (host, result) in results {
            match result {
                Ok(()) => {
                    joined += 1;
                    info!(host = %host.hostname, "joined as worker");
                }
                Err(e) => warn!(host = %host.hostname, error = %e, "failed to join as worker"),
            }
        }
        info!(joined, attempted = inactive.len(), "worker joins finished");
        Ok(())
    }

    async fn promote_worker(&self) -> Result<()> {
        let Some(host) = pick(&self.view.workers, "promote-worker") else {
            return Ok(());
        };
        let Some(node_id) = self.view.node_id(host) else {
            warn!(host = %host.hostname, "worker reported no node ID, not promoting");
            return Ok(());
        };

        self.set_role(node_id, NodeRole::Manager, Some(host)).await?;
        info!(host = %host.hostname, %node_id, "promoted worker to manager");
        self.label(host, true).await;
        Ok(())
    }

    async fn demote_manager(&self) -> Result<()> {
        let Some(host) = pick(&self.view.managers, "demote-manager") else {
            return Ok(());
        };
        let Some(node_id) = self.view.node_id(host) else {
            warn!(host = %host.hostname, "manager reported no node ID, not demoting");
            return Ok(());
        };

        self.set_role(node_id, NodeRole::Worker, Some(host)).await?;
        info!(host = %host.hostname, %node_id, "demoted manager to worker");
        self.label(host, false).await;
        Ok(())
    }

    /// Demote every manager-role orphan, then force-remove the orphans.
    ///
    /// An orphan whose demotion failed is left for a later cycle.
    async fn remove_stale_nodes(&self, orphans: &[ClusterNode]) -> Result<()> {
        let mut removable = Vec::with_capacity(orphans.len());
        for node in orphans {
            if node.role() == NodeRole::Manager {
                if let Err(e) = self.set_role(&node.id, NodeRole::Worker, None).await {
                    warn!(node_id = %node.id, address = %node.addr(), error = %e, "failed to demote stale manager");
                    continue;
                }
                info!(node_id = %node.id, address = %node.addr(), "demoted stale manager");
            }
            removable.push(node);
        }

        for node in removable {
            let removed = first_success("node-remove", &self.managers, |manager| {
                let client = self.connections.client(manager);
                let id = node.id.as_str();
                async move { client?.node_remove(id, true).await }
            })
            .await;
            match removed {
                Ok(_) => info!(node_id = %node.id, address = %node.addr(), "removed stale node"),
                Err(e) => warn!(node_id = %node.id, error = %e, "failed to remove stale node"),
            }
        }
        Ok(())
    }

    /// Change a node's role through a manager other than `subject`
    async fn set_role(&self, node_id: &str, role: NodeRole, subject: Option<&Host>) -> Result<()> {
        let others = self
            .managers
            .iter()
            .filter(|m| subject.map_or(true, |s| s.id != m.id));

        first_success("node-update", others, |manager| {
            let client = self.connections.client(manager);
            async move {
                let client = client?;
                let node = client.node_inspect(node_id).await?;
                let mut spec = node.spec;
                spec.role = role;
                client.node_update(node_id, node.version, &spec).await
            }
        })
        .await?;
        Ok(())
    }

    async fn join(&self, host: &Host, role: NodeRole, context: &JoinContext) -> Result<()> {
        let client = self.connections.client(host)?;
        client
            .swarm_join(&JoinRequest {
                listen_addr: self.config.listen_addr(),
                advertise_addr: host.agent_ip_address.clone(),
                remote_addrs: context.remote_addrs.clone(),
                join_token: context.tokens.for_role(role).to_string(),
            })
            .await?;
        Ok(())
    }

    async fn label(&self, host: &Host, manager: bool) {
        let updated = if manager {
            host.with_manager_label()
        } else {
            host.without_manager_label()
        };
        if let Err(e) = self.inventory.update_host(&updated).await {
            warn!(host = %host.hostname, manager, error = %e, "failed to update manager label");
        }
    }
}

/// Uniformly random candidate; an empty list is logged and yields nothing
fn pick<'h>(candidates: &'h [Host], operation: &str) -> Option<&'h Host> {
    let picked = candidates.choose(&mut rand::thread_rng());
    if picked.is_none() {
        warn!(operation, "no candidate host");
    }
    picked
}
