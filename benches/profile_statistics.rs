//! 📐 Profile statistics benchmarks - scoring sits on the payment path
//!
//! - one incremental fold: must stay O(1)
//! - full rebuild over a long history
//! - end-to-end detection against the in-memory backend

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use spending_anomaly::anomaly_detection::{
    AnomalyDetectionConfig, AnomalyDetector, MemoryStorage, StatisticsAccumulator, Transaction,
};
use std::sync::Arc;

fn history(len: usize) -> Vec<f64> {
    (0..len).map(|i| 50.0 + (i % 97) as f64 * 3.5).collect()
}

fn bench_incremental_fold(c: &mut Criterion) {
    let base = StatisticsAccumulator::from_batch(&history(1_000)).expect("non-empty history");

    c.bench_function("fold_one_transaction", |b| {
        b.iter(|| StatisticsAccumulator::from_fold(black_box(&base), black_box(187.25)))
    });
}

fn bench_batch_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_rebuild");
    for len in [100usize, 10_000, 100_000] {
        let values = history(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &values, |b, values| {
            b.iter(|| StatisticsAccumulator::from_batch(black_box(values)))
        });
    }
    group.finish();
}

fn bench_detect_anomaly(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let storage = Arc::new(MemoryStorage::new());
    let detector = AnomalyDetector::from_storage(AnomalyDetectionConfig::default(), storage.clone())
        .expect("default config is valid");

    runtime.block_on(async {
        for (i, amount) in history(200).into_iter().enumerate() {
            let tx = Transaction::expense("bench", "Market", Decimal::from(amount as i64))
                .with_description(format!("Store {}", i % 12))
                .at(chrono::Utc::now() - chrono::Duration::days(1 + i as i64));
            storage.insert_transaction(tx).expect("insert");
        }
        detector.rebuild_user_profile("bench", None).await.expect("rebuild");
    });

    let candidate = Transaction::expense("bench", "Market", Decimal::from(900)).with_description("New Store");
    c.bench_function("detect_anomaly_memory_backend", |b| {
        b.to_async(&runtime)
            .iter(|| async { detector.detect_anomaly(black_box(&candidate), "bench").await.expect("detect") })
    });
}

criterion_group!(benches, bench_incremental_fold, bench_batch_rebuild, bench_detect_anomaly);
criterion_main!(benches);
