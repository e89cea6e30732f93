//! Full reconciliation cycles against a simulated fleet

use std::sync::{Arc, Mutex};
use std::time::Duration;

use swarmkeeper::core::{ClusterNode, Decision, Hold, NodeRole};
use swarmkeeper::net::{Call, MockFleet, Op};
use swarmkeeper::runtime::{periodically, MockRuntime};
use swarmkeeper::{Error, ReconcileConfig, Reconciler};

fn reconciler(fleet: &MockFleet, managers: i64) -> Reconciler {
    let config = ReconcileConfig::builder().managers(managers).build();
    Reconciler::new(
        Arc::new(fleet.clone()),
        Arc::new(fleet.clone()),
        Arc::new(fleet.clone()),
        config,
    )
}

fn assert_all_closed(fleet: &MockFleet) {
    let mut opened = fleet.opened_connections();
    let mut closed = fleet.closed_connections();
    opened.sort();
    closed.sort();
    assert_eq!(opened, closed);
}

fn mutating(call: &Call) -> bool {
    matches!(
        call,
        Call::Init { .. }
            | Call::Join { .. }
            | Call::NetworkCreate { .. }
            | Call::NodeUpdate { .. }
            | Call::NodeRemove { .. }
            | Call::UpdateHost { .. }
    )
}

#[tokio::test]
async fn all_inactive_creates_cluster_and_network() {
    let fleet = MockFleet::inactive(5);
    let report = reconciler(&fleet, 3).run_once().await.unwrap();

    assert_eq!(report.decision, Decision::CreateCluster);
    assert_eq!(report.follow_up, Some(Decision::CreateNetwork));
    assert_eq!(report.counts.total, 5);
    assert_eq!(fleet.topology(), (1, 0));
    assert_eq!(fleet.networks(), vec!["rancher".to_string()]);

    let inits = fleet.calls_where(|c| matches!(c, Call::Init { .. }));
    assert_eq!(inits.len(), 1);
    let Call::Init { host } = &inits[0] else {
        unreachable!()
    };
    assert!(fleet.host(host).unwrap().is_labeled_manager());
    assert_all_closed(&fleet);
}

#[tokio::test]
async fn odd_managers_with_spare_workers_promotes() {
    let fleet = MockFleet::with_topology(3, 2, 0);
    let report = reconciler(&fleet, 5).run_once().await.unwrap();

    assert_eq!(report.decision, Decision::PromoteWorker);
    assert_eq!(fleet.topology(), (4, 1));

    let promoted: Vec<_> = ["1h4", "1h5"]
        .into_iter()
        .filter(|id| fleet.info(id).unwrap().control_available)
        .collect();
    assert_eq!(promoted.len(), 1);
    assert!(fleet.host(promoted[0]).unwrap().is_labeled_manager());
}

#[tokio::test]
async fn two_managers_without_workers_hold() {
    let fleet = MockFleet::with_topology(2, 0, 0);
    let report = reconciler(&fleet, 3).run_once().await.unwrap();

    assert_eq!(report.decision, Decision::None(Hold::QuorumGuard { managers: 2 }));
    assert!(fleet.calls_where(mutating).is_empty());
    assert_eq!(fleet.topology(), (2, 0));
}

#[tokio::test]
async fn single_manager_with_inactive_hosts_adds_manager() {
    let fleet = MockFleet::with_topology(1, 1, 2);
    let report = reconciler(&fleet, 3).run_once().await.unwrap();

    assert_eq!(report.decision, Decision::AddManager);
    assert_eq!(fleet.topology(), (2, 1));

    let joins = fleet.calls_where(|c| matches!(c, Call::Join { .. }));
    assert_eq!(joins.len(), 1);
    let Call::Join { host, role } = &joins[0] else {
        unreachable!()
    };
    assert_eq!(*role, Some(NodeRole::Manager));
    assert!(host == "1h3" || host == "1h4");
    assert!(fleet.host(host).unwrap().is_labeled_manager());
}

#[tokio::test]
async fn fleet_converges_to_target() {
    let fleet = MockFleet::inactive(5);
    let reconciler = reconciler(&fleet, 3);

    let mut decisions = Vec::new();
    for _ in 0..10 {
        let report = reconciler.run_once().await.unwrap();
        let done = report.decision == Decision::None(Hold::SteadyState);
        decisions.push(report.decision);
        if done {
            break;
        }
    }

    assert_eq!(
        decisions,
        vec![
            Decision::CreateCluster,
            Decision::AddManager,
            Decision::AddManager,
            Decision::AddWorkers,
            Decision::None(Hold::SteadyState),
        ]
    );
    assert_eq!(fleet.topology(), (3, 2));
    assert_all_closed(&fleet);
}

#[tokio::test]
async fn lowering_target_demotes_then_guards_quorum() {
    let fleet = MockFleet::with_topology(3, 0, 0);
    let reconciler = reconciler(&fleet, 1);

    let first = reconciler.run_once().await.unwrap();
    assert_eq!(first.decision, Decision::DemoteManager);
    assert_eq!(fleet.topology(), (2, 1));

    let second = reconciler.run_once().await.unwrap();
    assert_eq!(second.decision, Decision::None(Hold::QuorumGuard { managers: 2 }));
    assert_eq!(fleet.topology(), (2, 1));
}

#[tokio::test]
async fn demotion_never_goes_through_the_demoted_node() {
    for _ in 0..10 {
        let fleet = MockFleet::with_topology(3, 0, 0);
        reconciler(&fleet, 1).run_once().await.unwrap();

        let nodes = fleet.cluster_nodes();
        for call in fleet.calls_where(|c| matches!(c, Call::NodeUpdate { .. })) {
            let Call::NodeUpdate { via, node, .. } = call else {
                unreachable!()
            };
            let addr = nodes.iter().find(|n| n.id == node).unwrap().addr().to_string();
            let via_addr = fleet.host(&via).unwrap().agent_ip_address;
            assert_ne!(addr, via_addr);
        }
    }
}

#[tokio::test]
async fn stale_managers_are_demoted_before_any_removal() {
    let fleet = MockFleet::with_topology(3, 0, 0);
    fleet
        .add_orphan(ClusterNode::new("ghost-w", NodeRole::Worker, "10.9.9.1"))
        .add_orphan(ClusterNode::new("ghost-m", NodeRole::Manager, "10.9.9.2"));

    let report = reconciler(&fleet, 3).run_once().await.unwrap();
    assert!(matches!(
        report.decision,
        Decision::RemoveStaleNodes { ref orphans } if orphans.len() == 2
    ));

    let calls = fleet.calls();
    let demoted = calls
        .iter()
        .position(|c| matches!(c, Call::NodeUpdate { node, role: NodeRole::Worker, .. } if node == "ghost-m"))
        .unwrap();
    let removals: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, Call::NodeRemove { force: true, .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(removals.len(), 2);
    assert!(removals.iter().all(|&i| i > demoted));

    assert_eq!(fleet.cluster_nodes().len(), 3);
    let next = reconciler(&fleet, 3).run_once().await.unwrap();
    assert_eq!(next.decision, Decision::None(Hold::SteadyState));
}

#[tokio::test]
async fn conflicting_cluster_ids_take_no_action() {
    let fleet = MockFleet::with_topology(1, 0, 1);
    fleet.set_info(
        "1h2",
        swarmkeeper::core::DaemonInfo::manager("n9", "cluster-2", vec![]),
    );

    let result = reconciler(&fleet, 3).run_once().await;
    assert!(matches!(
        result,
        Err(Error::Core(swarmkeeper::core::Error::ClusterIdConflict { .. }))
    ));
    assert!(fleet.calls_where(mutating).is_empty());
    assert_all_closed(&fleet);
}

#[tokio::test]
async fn pending_daemon_aborts_cycle() {
    let fleet = MockFleet::with_topology(1, 0, 2);
    fleet.set_info(
        "1h3",
        swarmkeeper::core::DaemonInfo::with_state(swarmkeeper::core::LocalNodeState::Pending),
    );

    let result = reconciler(&fleet, 3).run_once().await;
    assert!(matches!(
        result,
        Err(Error::Core(swarmkeeper::core::Error::UnreconcilableState { pending: 1, .. }))
    ));
    assert!(fleet.calls_where(mutating).is_empty());
    assert_all_closed(&fleet);
}

#[tokio::test]
async fn one_unreachable_host_does_not_abort() {
    let fleet = MockFleet::inactive(5);
    fleet.set_unreachable("1h5");

    let report = reconciler(&fleet, 3).run_once().await.unwrap();
    assert_eq!(report.decision, Decision::CreateCluster);
    assert_eq!(report.counts.total, 4);
    assert_eq!(report.unreachable, 1);
    assert!(fleet.calls_where(|c| matches!(c, Call::Connect { host } if host == "1h5")).is_empty());
}

#[tokio::test]
async fn worker_join_failure_is_not_fatal() {
    let fleet = MockFleet::with_topology(3, 0, 3);
    fleet.fail("1h5", Op::Join);

    let report = reconciler(&fleet, 3).run_once().await.unwrap();
    assert_eq!(report.decision, Decision::AddWorkers);
    assert_eq!(fleet.topology(), (3, 2));
}

#[tokio::test]
async fn failed_action_still_closes_connections() {
    let fleet = MockFleet::inactive(3);
    for i in 1..=3 {
        fleet.fail(&format!("1h{i}"), Op::Init);
    }

    let result = reconciler(&fleet, 3).run_once().await;
    assert!(matches!(result, Err(Error::Net(_))));
    assert_eq!(fleet.closed_connections().len(), 3);
    assert_all_closed(&fleet);
}

#[tokio::test]
async fn daemon_without_info_does_not_block_creation() {
    let fleet = MockFleet::inactive(5);
    fleet.fail("1h5", Op::Info);
    let reconciler = reconciler(&fleet, 3);

    let first = reconciler.run_once().await.unwrap();
    assert_eq!(first.decision, Decision::CreateCluster);
    assert_eq!(first.counts.total, 4);
    assert_eq!(first.unreported, 1);
    assert_eq!(first.unreachable, 0);
    assert_eq!(fleet.topology(), (1, 0));
    assert!(fleet
        .calls_where(|c| matches!(c, Call::Init { host } if host == "1h5"))
        .is_empty());

    let second = reconciler.run_once().await.unwrap();
    assert_eq!(second.decision, Decision::AddManager);
    assert_eq!(fleet.topology(), (2, 0));
    assert!(fleet
        .calls_where(|c| matches!(c, Call::Join { host, .. } if host == "1h5"))
        .is_empty());
    assert_all_closed(&fleet);
}

#[tokio::test]
async fn daemon_without_info_does_not_block_promotion() {
    let fleet = MockFleet::with_topology(1, 3, 0);
    fleet.fail("1h4", Op::Info);

    let report = reconciler(&fleet, 3).run_once().await.unwrap();
    assert_eq!(report.decision, Decision::PromoteWorker);
    assert_eq!(report.counts.total, 3);
    assert_eq!(report.unreported, 1);
    assert_eq!(fleet.topology(), (2, 2));
    assert!(!fleet.info("1h4").unwrap().control_available);
}

#[tokio::test]
async fn workers_without_reachable_manager_hold() {
    let fleet = MockFleet::with_topology(1, 2, 1);
    fleet.set_unreachable("1h1");

    let report = reconciler(&fleet, 3).run_once().await.unwrap();
    assert_eq!(
        report.decision,
        Decision::None(Hold::NoManagerReachable { workers: 2 })
    );
    assert_eq!(report.unreachable, 1);
    assert!(fleet.calls_where(mutating).is_empty());
    assert!(fleet
        .calls_where(|c| matches!(c, Call::Inspect { .. }))
        .is_empty());
    assert_all_closed(&fleet);
}

#[tokio::test]
async fn role_update_fails_over_between_managers() {
    let fleet = MockFleet::with_topology(3, 2, 0);
    fleet.fail("1h1", Op::NodeUpdate);

    let report = reconciler(&fleet, 5).run_once().await.unwrap();
    assert_eq!(report.decision, Decision::PromoteWorker);
    assert_eq!(fleet.topology(), (4, 1));

    let updates = fleet.calls_where(|c| matches!(c, Call::NodeUpdate { .. }));
    let Some(Call::NodeUpdate { via, .. }) = updates.last() else {
        unreachable!()
    };
    assert_ne!(via, "1h1");
}

#[tokio::test]
async fn inventory_outage_fails_the_cycle() {
    let fleet = MockFleet::inactive(3);
    fleet.set_inventory_down();
    assert!(matches!(
        reconciler(&fleet, 3).run_once().await,
        Err(Error::Net(_))
    ));
}

#[tokio::test]
async fn scheduler_keeps_running_until_steady() {
    let fleet = MockFleet::inactive(4);
    let reconciler = reconciler(&fleet, 3);
    let runtime = MockRuntime::new();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let stop = Mutex::new(Some(stop));

    let reconciler = &reconciler;
    let stop = &stop;
    let cycles = periodically(
        &runtime,
        Duration::from_secs(15),
        async {
            let _ = stopped.await;
        },
        move || async move {
            let report = reconciler.run_once().await?;
            if report.decision == Decision::None(Hold::SteadyState) {
                if let Some(stop) = stop.lock().unwrap().take() {
                    let _ = stop.send(());
                }
            }
            Ok::<_, Error>(report)
        },
    )
    .await;

    assert_eq!(cycles, 5);
    assert_eq!(fleet.topology(), (3, 1));
}
