//! Manager failover
//!
//! Any manager can serve a cluster-level read or write, so manager-targeted
//! operations walk the manager list and stop at the first one that answers.

use std::future::Future;

use swarmkeeper_core::Host;
use tracing::warn;

use crate::{Error, Result};

/// Try `op` against each candidate in order, returning the first success
/// together with the candidate that produced it.
///
/// Each failure is logged and the next candidate is tried. Fails with
/// [`Error::AllCandidatesFailed`] when every candidate failed or there were
/// none.
pub async fn first_success<'h, I, T, F, Fut>(
    operation: &'static str,
    candidates: I,
    mut op: F,
) -> Result<(&'h Host, T)>
where
    I: IntoIterator<Item = &'h Host>,
    F: FnMut(&'h Host) -> Fut,
    Fut: Future<Output = swarmkeeper_net::Result<T>>,
{
    let mut attempts = 0;
    for candidate in candidates {
        attempts += 1;
        match op(candidate).await {
            Ok(value) => return Ok((candidate, value)),
            Err(e) => warn!(
                operation,
                host = %candidate.hostname,
                address = %candidate.agent_ip_address,
                error = %e,
                "manager failed, trying next"
            ),
        }
    }
    Err(Error::AllCandidatesFailed {
        operation,
        attempts,
    })
}
