//! Scoring benchmark: snapshot → rule evaluation, including the entropy
//! primitive the watcher runs per write.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ransomguard_agent::config::RulesConfig;
use ransomguard_agent::features::FeatureSnapshot;
use ransomguard_agent::scoring::{RuleBasedScorer, ScoringStrategy};
use ransomguard_agent::calculate_entropy;

fn hot_snapshot() -> FeatureSnapshot {
    FeatureSnapshot {
        process_identity: "ransom.exe:4242".to_string(),
        process_name: "ransom.exe".to_string(),
        pid: 4242,
        modify_count: 80,
        timespan_ms: 12_000,
        high_entropy_count: 12,
        avg_entropy: 0.93,
        entropy_samples: vec![0.93; 12],
        affected_paths: (0..80).map(|i| format!("/d/f{i}.txt")).collect(),
        ..Default::default()
    }
}

fn bench_rule_scoring(c: &mut Criterion) {
    let scorer = RuleBasedScorer::new(RulesConfig::default());
    let hot = hot_snapshot();
    let cold = FeatureSnapshot {
        process_identity: "emacs:1".to_string(),
        process_name: "emacs".to_string(),
        pid: 1,
        modify_count: 2,
        ..Default::default()
    };

    c.bench_function("score_hot_snapshot", |b| {
        b.iter(|| black_box(scorer.score(black_box(&hot))))
    });
    c.bench_function("score_cold_snapshot", |b| {
        b.iter(|| black_box(scorer.score(black_box(&cold))))
    });
}

fn bench_entropy(c: &mut Criterion) {
    let mut g = c.benchmark_group("entropy_by_size");
    for size in [4 * 1024usize, 64 * 1024] {
        let buf: Vec<u8> = (0..size).map(|i| (i * 31 % 251) as u8).collect();
        g.bench_function(format!("bytes_{size}").as_str(), |b| {
            b.iter(|| black_box(calculate_entropy(black_box(&buf))))
        });
    }
    g.finish();
}

criterion_group!(benches, bench_rule_scoring, bench_entropy);
criterion_main!(benches);
