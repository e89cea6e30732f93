use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use swarmkeeper_core::{
    analyze, ClusterNode, DaemonInfo, Host, ManagerTarget, NodeRole, Observation, WorldViewBuilder,
};

fn fleet(size: usize) -> (Vec<Host>, Vec<DaemonInfo>, Vec<ClusterNode>) {
    let hosts: Vec<Host> = (0..size)
        .map(|i| {
            let ip = format!("10.{}.{}.{}", i / 65536, (i / 256) % 256, i % 256);
            Host::new(format!("1h{i}"), format!("node-{i}"), ip)
        })
        .collect();
    let infos = (0..size)
        .map(|i| match i % 10 {
            0 if i < 50 => DaemonInfo::manager(format!("n{i}"), "c1", vec![]),
            9 => DaemonInfo::inactive(),
            _ => DaemonInfo::worker(format!("n{i}"), "c1"),
        })
        .collect();
    let nodes = hosts
        .iter()
        .enumerate()
        .map(|(i, h)| {
            ClusterNode::new(format!("n{i}"), NodeRole::Worker, h.agent_ip_address.clone())
        })
        .collect();
    (hosts, infos, nodes)
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    let target = ManagerTarget::new(5);

    for size in [10usize, 100, 1_000] {
        let (hosts, infos, nodes) = fleet(size);
        let mut builder = WorldViewBuilder::new(hosts.clone());
        for (host, info) in hosts.into_iter().zip(infos) {
            builder
                .record(Observation::collected(host, info))
                .expect("single cluster identity");
        }
        let mut view = builder.build();
        view.nodes = nodes;

        group.bench_with_input(BenchmarkId::from_parameter(size), &view, |b, view| {
            b.iter(|| analyze(black_box(view), target))
        });
    }

    group.finish();
}

fn bench_build_view(c: &mut Criterion) {
    let (hosts, infos, _) = fleet(1_000);
    c.bench_function("build_view_1000", |b| {
        b.iter(|| {
            let mut builder = WorldViewBuilder::new(hosts.clone());
            for (host, info) in hosts.iter().cloned().zip(infos.iter().cloned()) {
                let _ = builder.record(Observation::collected(host, info));
            }
            black_box(builder.build())
        })
    });
}

criterion_group!(benches, bench_analyze, bench_build_view);
criterion_main!(benches);
