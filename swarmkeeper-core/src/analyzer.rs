//! Cluster state analyzer
//!
//! A pure function from a [`WorldView`] and a [`ManagerTarget`] to exactly
//! one [`Decision`]. Rules are evaluated in priority order, first match wins:
//!
//! 1. Any pending, errored, or locked daemon aborts the cycle.
//! 2. Cluster nodes with no registered host are removed.
//! 3. Every reporting daemon inactive: create the cluster.
//! 4. Members but no manager among them: hold.
//! 5. Every reporting daemon active: promote, demote, or hold to keep the
//!    manager count odd and never drop from two managers to one.
//! 6. Otherwise hosts are waiting to join: add a manager or the workers.
//!
//! Hosts that answered the probe but reported no info are not counted.

use std::collections::BTreeSet;
use std::fmt;

use crate::daemon::ClusterNode;
use crate::host::Host;
use crate::target::ManagerTarget;
use crate::view::WorldView;
use crate::{Error, Result};

/// Why no action was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    /// No reachable host was observed
    NothingObserved,
    /// Topology already matches the target
    SteadyState,
    /// Demoting would leave a single manager
    QuorumGuard { managers: usize },
    /// Cluster members reported, but none of them is a manager
    NoManagerReachable { workers: usize },
}

impl fmt::Display for Hold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hold::NothingObserved => f.write_str("no reachable daemons observed"),
            Hold::SteadyState => f.write_str("cluster matches manager target"),
            Hold::QuorumGuard { managers } => write!(
                f,
                "can't demote with {managers} managers: this would result in a loss of quorum"
            ),
            Hold::NoManagerReachable { workers } => write!(
                f,
                "{workers} active workers but no reachable manager to carry membership changes"
            ),
        }
    }
}

/// The single corrective action chosen for a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Take no action
    None(Hold),
    /// Initialize a new cluster on one inactive host
    CreateCluster,
    /// Create the cluster's default overlay network
    CreateNetwork,
    /// Join one inactive host as a manager
    AddManager,
    /// Join every inactive host as a worker
    AddWorkers,
    /// Promote one active worker
    PromoteWorker,
    /// Demote one active manager
    DemoteManager,
    /// Demote and evict cluster nodes with no registered host
    RemoveStaleNodes { orphans: Vec<ClusterNode> },
}

impl Decision {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Decision::None(_) => "none",
            Decision::CreateCluster => "create-cluster",
            Decision::CreateNetwork => "create-network",
            Decision::AddManager => "add-manager",
            Decision::AddWorkers => "add-workers",
            Decision::PromoteWorker => "promote-worker",
            Decision::DemoteManager => "demote-manager",
            Decision::RemoveStaleNodes { .. } => "remove-nodes",
        }
    }

    /// Action that must always run after this one in the same cycle
    pub fn follow_up(&self) -> Option<Decision> {
        match self {
            Decision::CreateCluster => Some(Decision::CreateNetwork),
            _ => None,
        }
    }

    /// Whether join tokens must be fetched before executing
    pub fn requires_join_tokens(&self) -> bool {
        matches!(
            self,
            Decision::AddManager
                | Decision::AddWorkers
                | Decision::PromoteWorker
                | Decision::DemoteManager
        )
    }

    /// Whether this decision takes no action
    pub fn is_none(&self) -> bool {
        matches!(self, Decision::None(_))
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cluster nodes whose address matches no registered host
pub fn find_orphans(nodes: &[ClusterNode], registered: &[Host]) -> Vec<ClusterNode> {
    let known: BTreeSet<&str> = registered
        .iter()
        .map(|h| h.agent_ip_address.as_str())
        .collect();
    nodes
        .iter()
        .filter(|n| !known.contains(n.addr()))
        .cloned()
        .collect()
}

/// Choose the single action for this cycle
pub fn analyze(view: &WorldView, target: ManagerTarget) -> Result<Decision> {
    let c = view.counts();
    let target = target.get();

    if c.pending > 0 || c.error > 0 || c.locked > 0 {
        return Err(Error::UnreconcilableState {
            pending: c.pending,
            error: c.error,
            locked: c.locked,
        });
    }

    let orphans = find_orphans(&view.nodes, &view.registered);
    if !orphans.is_empty() {
        return Ok(Decision::RemoveStaleNodes { orphans });
    }

    if c.total == 0 {
        return Ok(Decision::None(Hold::NothingObserved));
    }

    if c.inactive == c.total {
        return Ok(Decision::CreateCluster);
    }

    if c.managers == 0 {
        return Ok(Decision::None(Hold::NoManagerReachable { workers: c.workers }));
    }

    let managers_even = c.managers % 2 == 0;

    if c.active == c.total {
        if c.managers < target && ((managers_even && c.workers >= 1) || c.workers >= 2) {
            return Ok(Decision::PromoteWorker);
        }
        if c.managers == 2 && (c.managers > target || c.workers == 0) {
            return Ok(Decision::None(Hold::QuorumGuard {
                managers: c.managers,
            }));
        }
        if c.managers > target || (managers_even && c.workers == 0) {
            return Ok(Decision::DemoteManager);
        }
        return Ok(Decision::None(Hold::SteadyState));
    }

    if c.managers < target && (managers_even || c.inactive >= 2) {
        Ok(Decision::AddManager)
    } else {
        Ok(Decision::AddWorkers)
    }
}
