//! Per-cycle world view
//!
//! Probes and info fetches run concurrently, one task per host. Each task
//! returns an [`Observation`]; the observer feeds them to a
//! [`WorldViewBuilder`] one at a time after the fan-out has joined, so the
//! aggregate is built single-threaded and no lock is needed.
//!
//! Invariants of a built [`WorldView`]:
//! - every host in `managers` or `workers` is in the `Active` bucket
//! - every bucketed host is reachable
//! - a reachable host without daemon info is in `unreported` and in no
//!   bucket, and is left out of every count
//! - at most one non-empty cluster identity was reported

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::daemon::{ClusterNode, DaemonInfo, LocalNodeState};
use crate::host::Host;
use crate::{Error, Result};

/// Outcome of probing and querying one reachable host
#[derive(Debug, Clone)]
pub struct Observation {
    /// The host that answered the probe
    pub host: Host,
    /// Its daemon info, if the fetch succeeded
    pub info: Option<DaemonInfo>,
}

impl Observation {
    /// Reachable host with collected info
    pub fn collected(host: Host, info: DaemonInfo) -> Self {
        Self {
            host,
            info: Some(info),
        }
    }

    /// Reachable host whose info fetch failed
    pub fn unreported(host: Host) -> Self {
        Self { host, info: None }
    }
}

/// Bucket sizes the analyzer decides on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub total: usize,
    pub inactive: usize,
    pub pending: usize,
    pub active: usize,
    pub error: usize,
    pub locked: usize,
    pub managers: usize,
    pub workers: usize,
}

/// Aggregate view of the fleet for one cycle
#[derive(Debug, Clone, Default)]
pub struct WorldView {
    /// Hosts registered in inventory
    pub registered: Vec<Host>,
    /// Hosts whose daemon port accepted a connection
    pub reachable: Vec<Host>,
    /// Reachable hosts whose daemon info could not be collected
    pub unreported: Vec<Host>,
    /// Hosts grouped by reported membership state
    pub by_state: BTreeMap<LocalNodeState, Vec<Host>>,
    /// Active hosts with control capability
    pub managers: Vec<Host>,
    /// Active hosts without control capability
    pub workers: Vec<Host>,
    /// Manager addresses reported by active managers
    pub manager_addrs: Vec<String>,
    /// The single cluster identity observed, if any
    pub cluster_id: Option<String>,
    /// Daemon info keyed by host ID
    pub info: HashMap<String, DaemonInfo>,
    /// Nodes tracked by the cluster, as listed by a manager
    pub nodes: Vec<ClusterNode>,
}

impl WorldView {
    /// Hosts reporting the given state
    pub fn in_state(&self, state: LocalNodeState) -> &[Host] {
        self.by_state.get(&state).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Inactive hosts, the candidates for init and join
    pub fn inactive(&self) -> &[Host] {
        self.in_state(LocalNodeState::Inactive)
    }

    /// Registered hosts that did not answer the probe
    pub fn unreachable(&self) -> Vec<&Host> {
        let reachable: BTreeSet<&str> = self.reachable.iter().map(|h| h.id.as_str()).collect();
        self.registered
            .iter()
            .filter(|h| !reachable.contains(h.id.as_str()))
            .collect()
    }

    /// Cluster node ID of a host, when its daemon reported one
    pub fn node_id(&self, host: &Host) -> Option<&str> {
        self.info
            .get(&host.id)
            .map(|info| info.node_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Counts used by the decision rules
    ///
    /// `total` covers only hosts that reported daemon info.
    pub fn counts(&self) -> StateCounts {
        let count = |state| self.in_state(state).len();
        StateCounts {
            total: self.info.len(),
            inactive: count(LocalNodeState::Inactive),
            pending: count(LocalNodeState::Pending),
            active: count(LocalNodeState::Active),
            error: count(LocalNodeState::Error),
            locked: count(LocalNodeState::Locked),
            managers: self.managers.len(),
            workers: self.workers.len(),
        }
    }
}

/// Single-threaded accumulator for a [`WorldView`]
#[derive(Debug, Default)]
pub struct WorldViewBuilder {
    view: WorldView,
    seen_addrs: BTreeSet<String>,
}

impl WorldViewBuilder {
    /// Start a view over the registered host list
    pub fn new(registered: Vec<Host>) -> Self {
        Self {
            view: WorldView {
                registered,
                ..WorldView::default()
            },
            seen_addrs: BTreeSet::new(),
        }
    }

    /// Merge one host's observation
    ///
    /// Fails with [`Error::ClusterIdConflict`] if the host reports a cluster
    /// identity different from one already recorded.
    pub fn record(&mut self, observation: Observation) -> Result<()> {
        let Observation { host, info } = observation;
        self.view.reachable.push(host.clone());

        let Some(info) = info else {
            self.view.unreported.push(host);
            return Ok(());
        };

        if let Some(cluster) = info.cluster() {
            match &self.view.cluster_id {
                None => self.view.cluster_id = Some(cluster.to_string()),
                Some(known) if known != cluster => {
                    return Err(Error::ClusterIdConflict {
                        first: known.clone(),
                        second: cluster.to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        if info.is_active_manager() {
            for addr in &info.remote_managers {
                if self.seen_addrs.insert(addr.clone()) {
                    self.view.manager_addrs.push(addr.clone());
                }
            }
            self.view.managers.push(host.clone());
        } else if info.is_active_worker() {
            self.view.workers.push(host.clone());
        }

        self.view
            .by_state
            .entry(info.local_node_state)
            .or_default()
            .push(host.clone());
        self.view.info.insert(host.id, info);
        Ok(())
    }

    /// Merge every observation, stopping at the first conflict
    pub fn record_all(&mut self, observations: impl IntoIterator<Item = Observation>) -> Result<()> {
        for observation in observations {
            self.record(observation)?;
        }
        Ok(())
    }

    /// Finish the view
    pub fn build(self) -> WorldView {
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(i: u8) -> Host {
        Host::new(format!("1h{i}"), format!("node-{i}"), format!("10.0.0.{i}"))
    }

    #[test]
    fn buckets_managers_and_workers() {
        let mut builder = WorldViewBuilder::new((1..=4).map(host).collect());
        builder
            .record_all(vec![
                Observation::collected(
                    host(1),
                    DaemonInfo::manager("n1", "c1", vec!["10.0.0.1:2377".into()]),
                ),
                Observation::collected(host(2), DaemonInfo::worker("n2", "c1")),
                Observation::collected(host(3), DaemonInfo::inactive()),
            ])
            .unwrap();
        let view = builder.build();

        let counts = view.counts();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.active, 2);
        assert_eq!(counts.inactive, 1);
        assert_eq!(counts.managers, 1);
        assert_eq!(counts.workers, 1);
        assert_eq!(view.cluster_id.as_deref(), Some("c1"));
        assert_eq!(view.manager_addrs, vec!["10.0.0.1:2377".to_string()]);
        assert_eq!(view.unreachable(), vec![&host(4)]);
        assert_eq!(view.node_id(&host(2)), Some("n2"));
        assert_eq!(view.node_id(&host(3)), None);
    }

    #[test]
    fn conflicting_cluster_ids_are_rejected() {
        let mut builder = WorldViewBuilder::new((1..=2).map(host).collect());
        builder
            .record(Observation::collected(
                host(1),
                DaemonInfo::manager("n1", "c1", vec![]),
            ))
            .unwrap();
        let err = builder
            .record(Observation::collected(host(2), DaemonInfo::worker("n2", "c2")))
            .unwrap_err();
        assert_eq!(
            err,
            Error::ClusterIdConflict {
                first: "c1".into(),
                second: "c2".into()
            }
        );
    }

    #[test]
    fn empty_cluster_id_never_conflicts() {
        let mut builder = WorldViewBuilder::new((1..=2).map(host).collect());
        let mut blank = DaemonInfo::inactive();
        blank.cluster_id = Some(String::new());
        builder
            .record_all(vec![
                Observation::collected(host(1), DaemonInfo::manager("n1", "c1", vec![])),
                Observation::collected(host(2), blank),
            ])
            .unwrap();
        assert_eq!(builder.build().cluster_id.as_deref(), Some("c1"));
    }

    #[test]
    fn unreported_host_is_reachable_but_uncounted() {
        let mut builder = WorldViewBuilder::new((1..=2).map(host).collect());
        builder
            .record_all(vec![
                Observation::collected(host(1), DaemonInfo::inactive()),
                Observation::unreported(host(2)),
            ])
            .unwrap();
        let view = builder.build();
        assert_eq!(view.reachable.len(), 2);
        assert_eq!(view.unreported, vec![host(2)]);
        assert!(view.unreachable().is_empty());

        let counts = view.counts();
        assert_eq!(counts.total, 1);
        assert_eq!(counts.inactive, counts.total);
    }

    #[test]
    fn duplicate_manager_addresses_collapse() {
        let addrs = vec!["10.0.0.1:2377".to_string(), "10.0.0.2:2377".to_string()];
        let mut builder = WorldViewBuilder::new((1..=2).map(host).collect());
        builder
            .record_all(vec![
                Observation::collected(host(1), DaemonInfo::manager("n1", "c1", addrs.clone())),
                Observation::collected(host(2), DaemonInfo::manager("n2", "c1", addrs.clone())),
            ])
            .unwrap();
        assert_eq!(builder.build().manager_addrs, addrs);
    }

    #[test]
    fn roles_are_subsets_of_active_bucket() {
        let mut builder = WorldViewBuilder::new((1..=5).map(host).collect());
        let mut pending_manager = DaemonInfo::manager("n3", "c1", vec![]);
        pending_manager.local_node_state = LocalNodeState::Pending;
        builder
            .record_all(vec![
                Observation::collected(host(1), DaemonInfo::manager("n1", "c1", vec![])),
                Observation::collected(host(2), DaemonInfo::worker("n2", "c1")),
                Observation::collected(host(3), pending_manager),
                Observation::collected(host(4), DaemonInfo::with_state(LocalNodeState::Error)),
            ])
            .unwrap();
        let view = builder.build();
        let active = view.in_state(LocalNodeState::Active);
        for h in view.managers.iter().chain(view.workers.iter()) {
            assert!(active.contains(h));
        }
        for hosts in view.by_state.values() {
            for h in hosts {
                assert!(view.reachable.contains(h));
            }
        }
    }
}
