//! Benchmarks for decision and pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fraudflow::core::{PipelineRun, StageResult};
use fraudflow::policy::DecisionPolicy;
use fraudflow::telemetry::NoOpTelemetry;
use fraudflow::testing::{fraud_pipeline, large_purchase, small_purchase};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

fn scored_run() -> PipelineRun {
    let mut run = PipelineRun::new(small_purchase());
    run.start().unwrap();
    run.append(StageResult::failed("customer_data", 0, "directory down", Duration::ZERO))
        .unwrap();
    let mut payload = HashMap::new();
    payload.insert("risk_score".to_string(), serde_json::json!(0.62));
    run.append(StageResult::success("risk_analysis", 1, payload, BTreeMap::new(), Duration::ZERO))
        .unwrap();
    run
}

fn decision_benchmark(c: &mut Criterion) {
    let policy = DecisionPolicy::new(0.75, 0.40).unwrap();
    let run = scored_run();

    c.bench_function("policy_decide", |b| b.iter(|| black_box(policy.decide(black_box(&run)))));
}

fn pipeline_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let pipeline = fraud_pipeline(Arc::new(NoOpTelemetry::new())).unwrap();

    c.bench_function("pipeline_run_approved", |b| {
        b.iter(|| rt.block_on(pipeline.run(black_box(small_purchase()))).unwrap());
    });
    c.bench_function("pipeline_run_blocked", |b| {
        b.iter(|| rt.block_on(pipeline.run(black_box(large_purchase()))).unwrap());
    });
}

criterion_group!(benches, decision_benchmark, pipeline_benchmark);
criterion_main!(benches);
