use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use factline_core::Cancellation;
use factline_rollup::aggregate::scan_and_aggregate_day;
use factline_storage::{OpenDalStore, ObjectStore};
use uuid::Uuid;

fn seed_day(rt: &tokio::runtime::Runtime, record_count: usize) -> (tempfile::TempDir, Arc<dyn ObjectStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ObjectStore> =
        Arc::new(OpenDalStore::new_fs(dir.path().to_str().unwrap(), Cancellation::new()).unwrap());

    let services = ["api-service", "auth-service", "billing-service"];
    let methods = ["GET", "POST", "PUT"];
    let mut lines = String::new();
    for i in 0..record_count {
        let second = i % 60;
        let minute = (i / 60) % 60;
        let hour = (i / 3600) % 24;
        lines.push_str(&format!(
            r#"{{"event_id":"{}","event_time":"2025-01-15T{hour:02}:{minute:02}:{second:02}Z","service":"{}","method":"{}","path_template":"/users/{{id}}","status_code":{},"latency_ms":{}}}"#,
            Uuid::now_v7(),
            services[i % services.len()],
            methods[i % methods.len()],
            if i % 20 == 0 { 500 } else { 200 },
            i % 250,
        ));
        lines.push('\n');
    }

    rt.block_on(async {
        store
            .put("raw/request_facts/2025-01-15/00/batch_bench.jsonl", Bytes::from(lines))
            .await
            .unwrap();
    });

    (dir, store)
}

fn bench_aggregate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let day = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();

    let mut group = c.benchmark_group("rollup_aggregate_day");
    for &count in &[1_000usize, 10_000, 50_000] {
        let (_dir, store) = seed_day(&rt, count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let (rows, _stats) = rt.block_on(scan_and_aggregate_day(store.as_ref(), day));
                criterion::black_box(rows);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_aggregate);
criterion_main!(benches);
