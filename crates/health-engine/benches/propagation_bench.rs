use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use health_engine::{
    HeartbeatEvaluator, HeartbeatSample, NodeRef, Observation, PropagationEngine,
    ScheduleThresholds, Status,
};
use std::hint::black_box;
use std::sync::Arc;
use vigil_core::SystemClock;

/// Benchmark a single heartbeat evaluation
fn benchmark_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("heartbeat_evaluation");
    let evaluator = HeartbeatEvaluator::default();
    let thresholds = ScheduleThresholds::new(200, 400);

    let fast = Observation::Reported(HeartbeatSample::succeeded(Utc::now(), Some(50)));
    let slow = Observation::Reported(HeartbeatSample::succeeded(Utc::now(), Some(500)));

    group.bench_function("healthy_sample", |b| {
        b.iter(|| evaluator.evaluate(black_box(&fast), &thresholds))
    });
    group.bench_function("critical_sample", |b| {
        b.iter(|| evaluator.evaluate(black_box(&slow), &thresholds))
    });

    group.finish();
}

/// Region -> datacenters -> services -> instances, `fanout` wide per level
fn build_tree(fanout: i64) -> (PropagationEngine, Vec<NodeRef>) {
    let engine = PropagationEngine::new(Arc::new(SystemClock));
    let region = NodeRef::region(1);
    let mut leaves = Vec::new();

    for d in 0..fanout {
        let dc = NodeRef::datacenter(d);
        engine.add_dependency(&region, &dc).unwrap();
        for s in 0..fanout {
            let service = NodeRef::service(d * fanout + s);
            engine.add_dependency(&dc, &service).unwrap();
            for i in 0..fanout {
                let instance = NodeRef::instance((d * fanout + s) * fanout + i);
                engine.add_dependency(&service, &instance).unwrap();
                engine.on_leaf_status_changed(&instance, Status::Healthy).unwrap();
                leaves.push(instance);
            }
        }
    }
    (engine, leaves)
}

/// Benchmark a leaf flip that changes every ancestor on the way up
fn benchmark_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("status_propagation");

    for fanout in [2i64, 4, 8].iter() {
        let (engine, leaves) = build_tree(*fanout);
        let leaf = leaves[0].clone();
        let mut flip = false;

        group.throughput(Throughput::Elements(leaves.len() as u64));
        group.bench_with_input(BenchmarkId::new("leaf_flip", fanout), fanout, |b, _| {
            b.iter(|| {
                flip = !flip;
                let status = if flip { Status::Critical } else { Status::Healthy };
                engine.on_leaf_status_changed(black_box(&leaf), status)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_evaluation, benchmark_propagation);
criterion_main!(benches);
