//! Fleet observer
//!
//! Builds the cycle's [`WorldView`] in three stages: list registered hosts,
//! probe every daemon port, then collect daemon info from every reachable
//! host. Probes and collections each fan out one task per host and join
//! before the next stage starts. Results are merged afterwards, one at a
//! time, by a [`WorldViewBuilder`].

use std::sync::Arc;

use swarmkeeper_core::{Host, Observation, WorldView, WorldViewBuilder};
use swarmkeeper_net::{DaemonClient, DaemonConnector, DaemonProbe, Inventory};
use swarmkeeper_runtime::{bounded, fan_out};
use tracing::{debug, info, warn};

use crate::connections::ConnectionSet;
use crate::failover::first_success;
use crate::{Error, ReconcileConfig, Result};

/// Result of collecting one host's daemon info
struct Collected {
    observation: Observation,
    client: Option<Arc<dyn DaemonClient>>,
}

/// Observes the fleet for one cycle
pub struct Observer<'a> {
    inventory: &'a dyn Inventory,
    probe: &'a dyn DaemonProbe,
    connector: &'a dyn DaemonConnector,
    config: &'a ReconcileConfig,
}

impl<'a> Observer<'a> {
    pub fn new(
        inventory: &'a dyn Inventory,
        probe: &'a dyn DaemonProbe,
        connector: &'a dyn DaemonConnector,
        config: &'a ReconcileConfig,
    ) -> Self {
        Self {
            inventory,
            probe,
            connector,
            config,
        }
    }

    /// Build the world view, registering every opened connection in `connections`
    pub async fn observe(&self, connections: &mut ConnectionSet) -> Result<WorldView> {
        let registered = self.inventory.list_hosts().await?;
        if registered.is_empty() {
            return Err(Error::NoHosts);
        }
        log_hosts(&registered);

        let reachable = self.probe_all(&registered).await;
        if reachable.is_empty() {
            return Err(Error::NoReachableDaemons {
                registered: registered.len(),
            });
        }

        let collected = fan_out(reachable, |host| self.collect(host)).await;
        let mut observations = Vec::with_capacity(collected.len());
        for Collected {
            observation,
            client,
        } in collected
        {
            if let Some(client) = client {
                connections.insert(observation.host.id.clone(), client);
            }
            observations.push(observation);
        }

        let mut builder = WorldViewBuilder::new(registered);
        builder.record_all(observations)?;
        let mut view = builder.build();

        if !view.managers.is_empty() {
            let listed = first_success("node-list", &view.managers, |manager| {
                let client = connections.client(manager);
                async move { client?.node_list().await }
            })
            .await;
            match listed {
                Ok((manager, nodes)) => {
                    debug!(host = %manager.hostname, nodes = nodes.len(), "listed cluster nodes");
                    view.nodes = nodes;
                }
                Err(e) => warn!(error = %e, "could not list cluster nodes"),
            }
        }

        Ok(view)
    }

    async fn probe_all(&self, registered: &[Host]) -> Vec<Host> {
        let timeout = self.config.probe_timeout;
        let probed = fan_out(registered, |host| async move {
            let result = match bounded(timeout, self.probe.probe(host)).await {
                Ok(result) => result,
                Err(_) => Err(swarmkeeper_net::Error::Timeout(timeout)),
            };
            (host, result)
        })
        .await;

        probed
            .into_iter()
            .filter_map(|(host, result)| match result {
                Ok(()) => Some(host.clone()),
                Err(e) => {
                    warn!(
                        host = %host.hostname,
                        address = %host.daemon_address(self.config.daemon_port),
                        error = %e,
                        "daemon unreachable"
                    );
                    None
                }
            })
            .collect()
    }

    async fn collect(&self, host: Host) -> Collected {
        let timeout = self.config.info_timeout;
        let client = match bounded(timeout, self.connector.connect(&host)).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return unreported(host, None, &e),
            Err(e) => return unreported(host, None, &e),
        };

        let fetched = bounded(timeout, async {
            client.negotiate_version().await?;
            client.info().await
        })
        .await;

        match fetched {
            Ok(Ok(info)) => {
                debug!(
                    host = %host.hostname,
                    state = %info.local_node_state,
                    manager = info.control_available,
                    "collected daemon info"
                );
                Collected {
                    observation: Observation::collected(host, info),
                    client: Some(client),
                }
            }
            Ok(Err(e)) => unreported(host, Some(client), &e),
            Err(e) => unreported(host, Some(client), &e),
        }
    }
}

fn unreported(
    host: Host,
    client: Option<Arc<dyn DaemonClient>>,
    error: &dyn std::fmt::Display,
) -> Collected {
    warn!(host = %host.hostname, error = %error, "failed to collect daemon info");
    Collected {
        observation: Observation::unreported(host),
        client,
    }
}

fn log_hosts(hosts: &[Host]) {
    info!(count = hosts.len(), "registered hosts");
    for host in hosts {
        info!(
            id = %host.id,
            host = %host.hostname,
            state = %host.state,
            address = %host.agent_ip_address,
            manager_label = host.is_labeled_manager(),
            "host"
        );
    }
}
