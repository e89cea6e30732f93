//! TCP liveness probe for daemon ports
//!
//! A successful connect means "reachable". The socket is closed immediately,
//! no protocol is spoken, and failures are not retried within a cycle.

use std::time::Duration;

use swarmkeeper_core::Host;
use tokio::net::TcpStream;

use crate::traits::DaemonProbe;
use crate::{Error, Result};

/// Port the container daemon listens on
pub const DAEMON_PORT: u16 = 2375;
/// Upper bound on a single probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempt a TCP connection to `address` within `timeout`
pub async fn probe_tcp(address: &str, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            Ok(())
        }
        Ok(Err(e)) => Err(Error::ConnectionFailed {
            address: address.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

/// Probes `{agent_ip}:{port}` over TCP
#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(DAEMON_PORT, PROBE_TIMEOUT)
    }
}

#[async_trait::async_trait]
impl DaemonProbe for TcpProbe {
    async fn probe(&self, host: &Host) -> Result<()> {
        probe_tcp(&host.daemon_address(self.port), self.timeout).await
    }
}
