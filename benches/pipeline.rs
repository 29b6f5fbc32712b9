//! Pipeline benchmark: events → window aggregation → snapshot.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ransomguard_agent::config::FeaturesConfig;
use ransomguard_agent::features::FeatureExtractor;
use ransomguard_agent::sources::{EventMetadata, FileActivityEvent, FileOperation, ProcessInfo};

fn make_events(n: usize) -> Vec<FileActivityEvent> {
    let now = Utc::now();
    (0..n)
        .map(|i| {
            FileActivityEvent::new(
                format!("/home/user/docs/file_{i}.txt"),
                FileOperation::Modify,
                now,
                ProcessInfo {
                    name: "bench".to_string(),
                    pid: 4242,
                    executable_path: Some("/usr/bin/bench".to_string()),
                },
                Some(EventMetadata {
                    file_size: Some(4096),
                    entropy: Some(0.42),
                    ..Default::default()
                }),
            )
        })
        .collect()
}

fn bench_observe(c: &mut Criterion) {
    let events = make_events(100);

    c.bench_function("observe_100_events", |b| {
        b.iter(|| {
            let extractor = FeatureExtractor::new(FeaturesConfig::default());
            for ev in &events {
                extractor.observe(black_box(ev));
            }
        })
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let extractor = FeatureExtractor::new(FeaturesConfig::default());
    for ev in make_events(1000) {
        extractor.observe(&ev);
    }

    c.bench_function("snapshot_1000_event_window", |b| {
        b.iter(|| black_box(extractor.snapshot("bench:4242")))
    });
}

fn bench_observe_then_snapshot(c: &mut Criterion) {
    let events = make_events(100);

    c.bench_function("observe_and_snapshot_per_event", |b| {
        b.iter(|| {
            let extractor = FeatureExtractor::new(FeaturesConfig::default());
            for ev in &events {
                extractor.observe(ev);
                black_box(extractor.snapshot(&ev.process_identity()));
            }
        })
    });
}

criterion_group!(benches, bench_observe, bench_snapshot, bench_observe_then_snapshot);
criterion_main!(benches);
