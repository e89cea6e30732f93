//! # Swarmkeeper
//!
//! **Keeps a container-daemon swarm's membership in line with its host inventory.**
//!
//! Each reconciliation cycle observes every registered host, decides on at
//! most one corrective action, applies it, and releases every connection it
//! opened. No state survives from one cycle to the next.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use swarmkeeper::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let inventory = RancherInventory::new(InventoryConfig::new(url, access_key, secret_key))?;
//!     let config = ReconcileConfig::builder().managers(5).build();
//!     let reconciler = Reconciler::with_defaults(Arc::new(inventory), config);
//!
//!     let report = reconciler.run_once().await?;
//!     println!("{}", report.decision);
//!     Ok(())
//! }
//! ```
//!
//! ## Crate Structure
//!
//! - [`swarmkeeper_core`]: Data model, world view, and the pure cluster analyzer
//! - [`swarmkeeper_net`]: Collaborator traits, HTTP and TCP clients, mock fleet
//! - [`swarmkeeper_runtime`]: Fan-out, timeouts, and the periodic scheduler

#![forbid(unsafe_code)]

use std::time::Duration;

// Re-export sub-crates
pub use swarmkeeper_core as core;
pub use swarmkeeper_net as net;
pub use swarmkeeper_runtime as runtime;

pub use swarmkeeper_core::{analyze, Decision, Hold, ManagerTarget, StateCounts, WorldView};

pub mod connections;
mod error;
pub mod executor;
pub mod failover;
pub mod observer;
pub mod reconciler;

pub use connections::ConnectionSet;
pub use error::{Error, Result};
pub use failover::first_success;
pub use reconciler::{CycleReport, Reconciler};

/// Prelude module for convenient imports
///
/// ```rust,ignore
/// use swarmkeeper::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::prelude::*;
    pub use crate::net::prelude::*;
    pub use crate::net::{InventoryConfig, RancherInventory};

    pub use crate::{CycleReport, ReconcileConfig, Reconciler};
}

/// Default cluster listen port
pub const SWARM_PORT: u16 = 2377;
/// Default name of the overlay network created with a new cluster
pub const OVERLAY_NETWORK: &str = "rancher";
/// Default time between the end of one cycle and the start of the next
pub const RECONCILE_PERIOD: Duration = Duration::from_secs(15);
/// Default bound on connect, negotiate, and info for one host
pub const INFO_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for reconciliation cycles
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Desired number of managers
    pub manager_target: ManagerTarget,
    /// Port the container daemon listens on
    pub daemon_port: u16,
    /// Cluster listen port
    pub swarm_port: u16,
    /// Upper bound on each daemon probe
    pub probe_timeout: Duration,
    /// Upper bound on each host's info collection
    pub info_timeout: Duration,
    /// Overlay network created after a new cluster
    pub overlay_network: String,
    /// Pause between cycles
    pub reconcile_period: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            manager_target: ManagerTarget::default(),
            daemon_port: net::DAEMON_PORT,
            swarm_port: SWARM_PORT,
            probe_timeout: net::PROBE_TIMEOUT,
            info_timeout: INFO_TIMEOUT,
            overlay_network: OVERLAY_NETWORK.to_string(),
            reconcile_period: RECONCILE_PERIOD,
        }
    }
}

impl ReconcileConfig {
    /// Create a new builder
    pub fn builder() -> ReconcileConfigBuilder {
        ReconcileConfigBuilder::new()
    }

    /// Address a daemon listens on for cluster traffic
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.swarm_port)
    }
}

/// Builder for ReconcileConfig
#[derive(Debug, Default)]
pub struct ReconcileConfigBuilder {
    config: ReconcileConfig,
}

impl ReconcileConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a manager count; normalized to an odd value in `[1, 9]`
    pub fn managers(mut self, requested: i64) -> Self {
        self.config.manager_target = ManagerTarget::new(requested);
        self
    }

    /// Set an already-normalized manager target
    pub fn manager_target(mut self, target: ManagerTarget) -> Self {
        self.config.manager_target = target;
        self
    }

    pub fn daemon_port(mut self, port: u16) -> Self {
        self.config.daemon_port = port;
        self
    }

    pub fn swarm_port(mut self, port: u16) -> Self {
        self.config.swarm_port = port;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    pub fn info_timeout(mut self, timeout: Duration) -> Self {
        self.config.info_timeout = timeout;
        self
    }

    /// Set the overlay network name
    pub fn overlay_network(mut self, name: impl Into<String>) -> Self {
        self.config.overlay_network = name.into();
        self
    }

    /// Set the pause between cycles
    pub fn reconcile_period(mut self, period: Duration) -> Self {
        self.config.reconcile_period = period;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ReconcileConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReconcileConfig::default();
        assert_eq!(config.manager_target.get(), 3);
        assert_eq!(config.daemon_port, 2375);
        assert_eq!(config.swarm_port, 2377);
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.info_timeout, Duration::from_secs(10));
        assert_eq!(config.overlay_network, "rancher");
        assert_eq!(config.reconcile_period, Duration::from_secs(15));
        assert_eq!(config.listen_addr(), "0.0.0.0:2377");
    }

    #[test]
    fn test_config_builder() {
        let config = ReconcileConfig::builder()
            .managers(4)
            .overlay_network("mesh")
            .reconcile_period(Duration::from_secs(30))
            .swarm_port(4377)
            .build();

        assert_eq!(config.manager_target.get(), 5);
        assert_eq!(config.overlay_network, "mesh");
        assert_eq!(config.reconcile_period, Duration::from_secs(30));
        assert_eq!(config.listen_addr(), "0.0.0.0:4377");
    }
}
