//! # Swarmkeeper Core
//!
//! Cluster membership model and reconciliation decision logic.
//!
//! This crate performs no I/O and provides:
//! - The host and daemon data model shared by every other crate
//! - Manager-target normalization (odd counts in `[1, 9]`)
//! - World view aggregation from per-host observations
//! - The cluster state analyzer that turns a world view into one [`Decision`]
//!
//! Everything here is deterministic, so the decision rules are tested
//! without a fleet, a daemon, or a runtime.

#![forbid(unsafe_code)]

pub mod analyzer;
pub mod daemon;
pub mod host;
pub mod target;
pub mod view;

pub use analyzer::{analyze, find_orphans, Decision, Hold};
pub use daemon::{
    ClusterNode, DaemonInfo, JoinTokens, LocalNodeState, NodeRole, NodeSpec, NodeStatus,
    NodeVersion,
};
pub use host::{Host, MANAGER_LABEL};
pub use target::{ManagerTarget, TargetAdjustment};
pub use view::{Observation, StateCounts, WorldView, WorldViewBuilder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::analyzer::*;
    pub use crate::daemon::*;
    pub use crate::host::*;
    pub use crate::target::*;
    pub use crate::view::*;
}

/// Result type for core operations
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that abort a reconciliation cycle before any action is taken
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Two reachable daemons belong to different clusters
    #[error(
        "multiple cluster IDs detected ({first}, {second}); split-brain must be resolved manually"
    )]
    ClusterIdConflict {
        /// Identity seen first
        first: String,
        /// Conflicting identity
        second: String,
    },

    /// Some daemons are pending, faulted, or locked
    #[error(
        "unreconcilable daemon states (pending: {pending}, error: {error}, locked: {locked}); operator intervention required"
    )]
    UnreconcilableState {
        /// Daemons stuck mid-join
        pending: usize,
        /// Daemons in error state
        error: usize,
        /// Daemons with a locked cluster
        locked: usize,
    },
}
