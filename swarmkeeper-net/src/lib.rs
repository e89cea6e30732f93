//! # Swarmkeeper Network
//!
//! Transports to the collaborators a reconciliation cycle talks to.
//!
//! This crate provides:
//! - Collaborator traits: [`Inventory`], [`DaemonProbe`], [`DaemonConnector`], [`DaemonClient`]
//! - A TCP liveness probe for daemon ports
//! - An engine-API client for container daemons over HTTP
//! - A Rancher v2 inventory client
//! - An in-memory [`MockFleet`] implementing every trait, for tests

#![forbid(unsafe_code)]

use std::time::Duration;

pub mod docker;
pub mod probe;
pub mod rancher;
pub mod traits;

mod mock;
pub use mock::{Call, MockFleet, Op};

pub use docker::{HttpDaemonClient, HttpDaemonConnector};
pub use probe::{probe_tcp, TcpProbe, DAEMON_PORT, PROBE_TIMEOUT};
pub use rancher::{InventoryConfig, RancherInventory};
pub use traits::{
    DaemonClient, DaemonConnector, DaemonProbe, InitRequest, Inventory, JoinRequest,
    NetworkCreated, NetworkOptions, SwarmInspect,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::traits::*;
}

/// Result type for network operations
pub type Result<T> = core::result::Result<T, Error>;

/// Network error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// TCP or HTTP connection could not be established
    #[error("connection to {address} failed: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// Operation did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level HTTP failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status not covered by a more specific variant
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// Resource already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// Resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Response body could not be decoded
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Client was closed at cycle end
    #[error("connection closed")]
    Closed,

    /// Address could not be used to build a client
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Whether the error reports an already-existing resource
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}
