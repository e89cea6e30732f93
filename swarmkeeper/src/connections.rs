//! Per-cycle control connections
//!
//! Connections are opened while daemon info is collected and reused by the
//! executor for calls against the same host. A [`ConnectionSet`] lives for
//! exactly one cycle; every connection it holds is closed when the cycle
//! ends, including when the set is dropped on an early return.

use std::collections::HashMap;
use std::sync::Arc;

use swarmkeeper_core::Host;
use swarmkeeper_net::{DaemonClient, Error as NetError};
use tracing::debug;

/// Open connections keyed by host ID
#[derive(Default)]
pub struct ConnectionSet {
    clients: HashMap<String, Arc<dyn DaemonClient>>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection; a previous connection to the same host is closed
    pub fn insert(&mut self, host_id: impl Into<String>, client: Arc<dyn DaemonClient>) {
        if let Some(previous) = self.clients.insert(host_id.into(), client) {
            previous.close();
        }
    }

    /// Connection to `host`, if one was opened this cycle
    pub fn get(&self, host: &Host) -> Option<Arc<dyn DaemonClient>> {
        self.clients.get(&host.id).cloned()
    }

    /// Connection to `host`, or an error naming the host
    pub fn client(&self, host: &Host) -> swarmkeeper_net::Result<Arc<dyn DaemonClient>> {
        self.get(host)
            .ok_or_else(|| NetError::NotFound(format!("no open connection to host {}", host.id)))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Close and forget every connection. Safe to call repeatedly.
    pub fn close_all(&mut self) {
        if self.clients.is_empty() {
            return;
        }
        debug!(count = self.clients.len(), "closing daemon connections");
        for (_, client) in self.clients.drain() {
            client.close();
        }
    }
}

impl std::fmt::Debug for ConnectionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut hosts: Vec<&String> = self.clients.keys().collect();
        hosts.sort();
        f.debug_struct("ConnectionSet").field("hosts", &hosts).finish()
    }
}

impl Drop for ConnectionSet {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmkeeper_net::{DaemonConnector, MockFleet};

    #[tokio::test]
    async fn drop_closes_every_connection() {
        let fleet = MockFleet::inactive(2);
        {
            let mut set = ConnectionSet::new();
            for i in 1..=2 {
                let host = MockFleet::numbered(i);
                set.insert(host.id.clone(), fleet.connect(&host).await.unwrap());
            }
            assert_eq!(set.len(), 2);
        }
        let mut closed = fleet.closed_connections();
        closed.sort();
        assert_eq!(closed, vec!["1h1".to_string(), "1h2".to_string()]);
    }

    #[tokio::test]
    async fn close_all_is_idempotent() {
        let fleet = MockFleet::inactive(1);
        let host = MockFleet::numbered(1);
        let mut set = ConnectionSet::new();
        set.insert(host.id.clone(), fleet.connect(&host).await.unwrap());

        set.close_all();
        set.close_all();
        drop(set);
        assert_eq!(fleet.closed_connections().len(), 1);
    }

    #[tokio::test]
    async fn missing_connection_is_an_error() {
        let set = ConnectionSet::new();
        let host = MockFleet::numbered(7);
        assert!(set.get(&host).is_none());
        assert!(matches!(set.client(&host), Err(NetError::NotFound(_))));
    }

    #[tokio::test]
    async fn replacing_a_connection_closes_the_old_one() {
        let fleet = MockFleet::inactive(1);
        let host = MockFleet::numbered(1);
        let mut set = ConnectionSet::new();
        set.insert(host.id.clone(), fleet.connect(&host).await.unwrap());
        set.insert(host.id.clone(), fleet.connect(&host).await.unwrap());
        assert_eq!(fleet.closed_connections().len(), 1);
        set.close_all();
        assert_eq!(fleet.closed_connections().len(), 2);
    }
}
