//! Cycle-level errors
//!
//! Anything that reaches [`crate::Reconciler::run_once`] as an `Err` aborts the
//! cycle; the scheduler logs it and starts fresh on the next tick.

/// Result type for reconciliation cycles
pub type Result<T> = core::result::Result<T, Error>;

/// Reasons a reconciliation cycle stops early
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Inventory returned an empty host list
    #[error("no hosts registered in inventory")]
    NoHosts,

    /// Every registered host failed the daemon probe
    #[error("no reachable daemons among {registered} registered hosts")]
    NoReachableDaemons { registered: usize },

    /// A manager-targeted operation failed on every candidate manager
    #[error("{operation} failed on all {attempts} candidate managers")]
    AllCandidatesFailed {
        operation: &'static str,
        attempts: usize,
    },

    /// Identity conflict or unreconcilable daemon states
    #[error(transparent)]
    Core(#[from] swarmkeeper_core::Error),

    /// Inventory or daemon call failed
    #[error(transparent)]
    Net(#[from] swarmkeeper_net::Error),
}
