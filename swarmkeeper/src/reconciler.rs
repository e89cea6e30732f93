//! Reconciliation cycle
//!
//! [`Reconciler::run_once`] is the unit the scheduler invokes: observe,
//! analyze, act, clean up. All per-cycle state (connections, world view,
//! executor) is created inside the call and dropped before it returns.

use std::sync::Arc;

use swarmkeeper_core::{analyze, Decision, Hold, StateCounts};
use swarmkeeper_net::{DaemonConnector, DaemonProbe, HttpDaemonConnector, Inventory, TcpProbe};
use tracing::{info, warn};

use crate::connections::ConnectionSet;
use crate::executor::Executor;
use crate::observer::Observer;
use crate::{ReconcileConfig, Result};

/// Outcome of one successful cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Action chosen by the analyzer
    pub decision: Decision,
    /// Second step run after the decision, if any
    pub follow_up: Option<Decision>,
    /// Bucket sizes the decision was based on
    pub counts: StateCounts,
    /// Registered hosts that failed the probe
    pub unreachable: usize,
    /// Reachable hosts whose daemon info could not be collected
    pub unreported: usize,
}

/// Runs reconciliation cycles against a fleet
pub struct Reconciler {
    inventory: Arc<dyn Inventory>,
    probe: Arc<dyn DaemonProbe>,
    connector: Arc<dyn DaemonConnector>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        probe: Arc<dyn DaemonProbe>,
        connector: Arc<dyn DaemonConnector>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            inventory,
            probe,
            connector,
            config,
        }
    }

    /// Reconciler that probes over TCP and talks to daemons over HTTP
    pub fn with_defaults(inventory: Arc<dyn Inventory>, config: ReconcileConfig) -> Self {
        let probe = TcpProbe::new(config.daemon_port, config.probe_timeout);
        let connector = HttpDaemonConnector::new(config.daemon_port, config.info_timeout);
        Self::new(inventory, Arc::new(probe), Arc::new(connector), config)
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Run one full cycle.
    ///
    /// Every connection opened during the cycle is closed before this
    /// returns, whatever the outcome.
    pub async fn run_once(&self) -> Result<CycleReport> {
        let mut connections = ConnectionSet::new();
        let result = self.cycle(&mut connections).await;
        connections.close_all();
        result
    }

    async fn cycle(&self, connections: &mut ConnectionSet) -> Result<CycleReport> {
        let observer = Observer::new(
            self.inventory.as_ref(),
            self.probe.as_ref(),
            self.connector.as_ref(),
            &self.config,
        );
        let view = observer.observe(connections).await?;

        let counts = view.counts();
        let unreachable = view.unreachable().len();
        let unreported = view.unreported.len();
        info!(
            total = counts.total,
            unreachable,
            unreported,
            inactive = counts.inactive,
            active = counts.active,
            managers = counts.managers,
            workers = counts.workers,
            target = self.config.manager_target.get(),
            "observed fleet"
        );

        let decision = analyze(&view, self.config.manager_target)?;
        match &decision {
            Decision::None(
                hold @ (Hold::QuorumGuard { .. } | Hold::NoManagerReachable { .. }),
            ) => warn!("{hold}"),
            Decision::None(hold) => info!(reason = %hold, "no action"),
            other => info!(decision = other.name(), "applying decision"),
        }

        let mut executor = Executor::new(&view, connections, self.inventory.as_ref(), &self.config);
        executor.execute(&decision).await?;

        let follow_up = decision.follow_up();
        if let Some(next) = &follow_up {
            info!(decision = next.name(), "applying follow-up");
            executor.execute(next).await?;
        }

        Ok(CycleReport {
            decision,
            follow_up,
            counts,
            unreachable,
            unreported,
        })
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
