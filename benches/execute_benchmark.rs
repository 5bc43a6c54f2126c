use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion};
use isojs::executor::Executor;
use isojs::registry::Registry;
use isojs::vm::Vm;
use tokio::runtime::Runtime;

fn bench_vm_new(c: &mut Criterion) {
    c.bench_function("Vm/new", |b| b.iter(|| Vm::new().unwrap()));
}

fn bench_evaluate_simple(c: &mut Criterion) {
    let vm = Vm::new().unwrap();

    c.bench_function("Vm/evaluate_simple", |b| {
        b.iter(|| vm.evaluate(b"2 + 3;").unwrap())
    });
}

fn bench_evaluate_json_export(c: &mut Criterion) {
    let vm = Vm::new().unwrap();

    c.bench_function("Vm/evaluate_json_export", |b| {
        b.iter(|| {
            vm.evaluate(
                br#"
                ({
                    message: 'Hello',
                    count: 42,
                    items: [1, 2, 3, 4, 5],
                    nested: { ok: true }
                });
            "#,
            )
            .unwrap()
        })
    });
}

fn bench_executor_roundtrip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = Arc::new(Registry::new());
    let executor = Executor::new(registry, 64 * 1024);

    c.bench_function("Executor/execute", |b| {
        b.iter(|| {
            rt.block_on(async {
                let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
                executor
                    .execute(Bytes::from_static(b"2 + 3;"), deadline)
                    .await
                    .unwrap()
            })
        })
    });
}

criterion_group!(
    benches,
    bench_vm_new,
    bench_evaluate_simple,
    bench_evaluate_json_export,
    bench_executor_roundtrip,
);

criterion_main!(benches);
