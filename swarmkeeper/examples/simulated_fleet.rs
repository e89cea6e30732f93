//! Simulated Fleet Example
//!
//! Runs reconciliation cycles against an in-memory fleet of seven fresh
//! hosts until the cluster settles at the manager target.

use std::sync::Arc;

use swarmkeeper::net::MockFleet;
use swarmkeeper::{Decision, Hold, ReconcileConfig, Reconciler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    println!("Swarmkeeper Simulated Fleet Example");
    println!("===================================");

    let fleet = MockFleet::inactive(7);
    let config = ReconcileConfig::builder().managers(5).build();
    println!("Manager target: {}", config.manager_target);

    let reconciler = Reconciler::new(
        Arc::new(fleet.clone()),
        Arc::new(fleet.clone()),
        Arc::new(fleet.clone()),
        config,
    );

    for cycle in 1..=10 {
        let report = reconciler.run_once().await?;
        let (managers, workers) = fleet.topology();
        println!(
            "cycle {cycle}: {:<16} managers={managers} workers={workers}",
            report.decision.name()
        );
        if report.decision == Decision::None(Hold::SteadyState) {
            break;
        }
    }

    println!("\nNetworks: {:?}", fleet.networks());
    Ok(())
}
