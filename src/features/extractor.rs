//! Sliding-window state per process identity: raw samples go in on
//! `observe`, aggregates come out of `snapshot`. Only this type mutates
//! window state; everything downstream sees cloned snapshots.

use super::{ExtensionChange, FeatureSnapshot};
use crate::config::FeaturesConfig;
use crate::sources::{FileActivityEvent, FileOperation};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

/// Hard cap on retained samples per key; a runaway process cannot grow the
/// window without bound inside one eviction interval.
const MAX_SAMPLES_PER_KEY: usize = 4096;

/// Stale-key sweep cadence, in observe calls.
const PRUNE_INTERVAL: u64 = 512;

#[derive(Debug, Clone)]
struct WindowSample {
    ts: DateTime<Utc>,
    operation: FileOperation,
    path: String,
    created_name: Option<String>,
    entropy: Option<f64>,
    extension_change: Option<ExtensionChange>,
}

#[derive(Debug, Default)]
struct KeyState {
    process_name: String,
    pid: u32,
    samples: VecDeque<WindowSample>,
}

pub struct FeatureExtractor {
    config: FeaturesConfig,
    windows: Mutex<HashMap<String, KeyState>>,
    observed: std::sync::atomic::AtomicU64,
}

impl FeatureExtractor {
    pub fn new(config: FeaturesConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
            observed: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.config.window_secs as i64)
    }

    /// Fold one event into its process window, evicting expired samples first.
    pub fn observe(&self, event: &FileActivityEvent) {
        let key = event.process_identity();
        let cutoff = event.timestamp - self.window();

        let mut windows = self.windows.lock().expect("window lock");
        let state = windows.entry(key).or_insert_with(|| KeyState {
            process_name: event.process.name.clone(),
            pid: event.process.pid,
            samples: VecDeque::new(),
        });

        while state
            .samples
            .front()
            .map(|s| s.ts < cutoff)
            .unwrap_or(false)
        {
            state.samples.pop_front();
        }
        while state.samples.len() >= MAX_SAMPLES_PER_KEY {
            state.samples.pop_front();
        }

        state.samples.push_back(WindowSample {
            ts: event.timestamp,
            operation: event.operation,
            path: event.path.clone(),
            created_name: (event.operation == FileOperation::Create)
                .then(|| base_name(&event.path)),
            entropy: match event.operation {
                FileOperation::Create | FileOperation::Modify => {
                    event.metadata.as_ref().and_then(|m| m.entropy)
                }
                _ => None,
            },
            extension_change: extension_change(event),
        });
        drop(windows);

        let n = self
            .observed
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if n % PRUNE_INTERVAL == PRUNE_INTERVAL - 1 {
            self.prune_stale(event.timestamp);
        }
    }

    /// Aggregate the current window for `key`. Pure read; expired samples are
    /// excluded without mutating state.
    pub fn snapshot(&self, key: &str) -> FeatureSnapshot {
        self.snapshot_at(key, Utc::now())
    }

    pub fn snapshot_at(&self, key: &str, now: DateTime<Utc>) -> FeatureSnapshot {
        let cutoff = now - self.window();
        let windows = self.windows.lock().expect("window lock");
        let Some(state) = windows.get(key) else {
            return FeatureSnapshot {
                process_identity: key.to_string(),
                ..Default::default()
            };
        };

        let mut snap = FeatureSnapshot {
            process_identity: key.to_string(),
            process_name: state.process_name.clone(),
            pid: state.pid,
            ..Default::default()
        };

        let mut first: Option<DateTime<Utc>> = None;
        let mut last: Option<DateTime<Utc>> = None;
        let mut seen_paths = std::collections::HashSet::new();

        for s in state.samples.iter().filter(|s| s.ts >= cutoff) {
            match s.operation {
                FileOperation::Create => snap.create_count += 1,
                FileOperation::Modify => snap.modify_count += 1,
                FileOperation::Delete => snap.delete_count += 1,
                FileOperation::Rename => snap.rename_count += 1,
                FileOperation::PermissionChange => snap.permission_change_count += 1,
            }
            if seen_paths.insert(s.path.clone()) {
                snap.affected_paths.push(s.path.clone());
            }
            if let Some(name) = &s.created_name {
                snap.created_names.push(name.clone());
            }
            if let Some(e) = s.entropy {
                snap.entropy_samples.push(e);
                if e > self.config.high_entropy_threshold {
                    snap.high_entropy_count += 1;
                }
            }
            if let Some(c) = &s.extension_change {
                snap.extension_changes.push(c.clone());
            }
            first.get_or_insert(s.ts);
            last = Some(s.ts);
        }

        snap.unique_path_count = seen_paths.len() as u32;
        if !snap.entropy_samples.is_empty() {
            snap.avg_entropy =
                snap.entropy_samples.iter().sum::<f64>() / snap.entropy_samples.len() as f64;
        }
        // a single event has no extent
        if let (Some(a), Some(b)) = (first, last) {
            if snap.total_events() >= 2 {
                snap.timespan_ms = (b - a).num_milliseconds();
            }
        }
        snap
    }

    /// Drop keys whose newest sample already fell out of the window.
    fn prune_stale(&self, now: DateTime<Utc>) {
        let cutoff = now - self.window();
        let mut windows = self.windows.lock().expect("window lock");
        windows.retain(|_, state| {
            state
                .samples
                .back()
                .map(|s| s.ts >= cutoff)
                .unwrap_or(false)
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().expect("window lock").len()
    }
}

/// Extension pair from a rename's old/new paths, recorded only when the
/// extension actually changed.
fn extension_change(event: &FileActivityEvent) -> Option<ExtensionChange> {
    if event.operation != FileOperation::Rename {
        return None;
    }
    let meta = event.metadata.as_ref()?;
    let old = extension_of(meta.old_path.as_deref()?);
    let new = extension_of(meta.new_path.as_deref().unwrap_or(&event.path));
    if old != new {
        Some(ExtensionChange { from: old, to: new })
    } else {
        None
    }
}

fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string()
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{EventMetadata, ProcessInfo};

    fn event(op: FileOperation, path: &str, ts: DateTime<Utc>) -> FileActivityEvent {
        FileActivityEvent::new(
            path.to_string(),
            op,
            ts,
            ProcessInfo {
                name: "worker".into(),
                pid: 7,
                executable_path: None,
            },
            None,
        )
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(FeaturesConfig::default())
    }

    #[test]
    fn single_event_has_zero_timespan() {
        let x = extractor();
        let now = Utc::now();
        let ev = event(FileOperation::Modify, "/d/a.txt", now);
        x.observe(&ev);
        let snap = x.snapshot_at(&ev.process_identity(), now);
        assert_eq!(snap.modify_count, 1);
        assert_eq!(snap.timespan_ms, 0);
    }

    #[test]
    fn window_evicts_old_samples() {
        let x = extractor();
        let now = Utc::now();
        let old = event(FileOperation::Modify, "/d/old.txt", now - Duration::seconds(600));
        let fresh = event(FileOperation::Modify, "/d/new.txt", now);
        x.observe(&old);
        x.observe(&fresh);
        let snap = x.snapshot_at(&fresh.process_identity(), now);
        assert_eq!(snap.modify_count, 1);
        assert_eq!(snap.affected_paths, vec!["/d/new.txt".to_string()]);
    }

    #[test]
    fn rename_records_extension_change_only_when_it_differs() {
        let x = extractor();
        let now = Utc::now();
        let mut renamed = event(FileOperation::Rename, "/d/a.locked", now);
        renamed.metadata = Some(EventMetadata {
            old_path: Some("/d/a.txt".into()),
            new_path: Some("/d/a.locked".into()),
            ..Default::default()
        });
        let mut same = event(FileOperation::Rename, "/d/b.txt", now);
        same.metadata = Some(EventMetadata {
            old_path: Some("/d/c.txt".into()),
            new_path: Some("/d/b.txt".into()),
            ..Default::default()
        });
        x.observe(&renamed);
        x.observe(&same);
        let snap = x.snapshot_at(&renamed.process_identity(), now);
        assert_eq!(snap.rename_count, 2);
        assert_eq!(
            snap.extension_changes,
            vec![ExtensionChange {
                from: "txt".into(),
                to: "locked".into()
            }]
        );
    }

    #[test]
    fn entropy_samples_feed_average_and_high_count() {
        let x = extractor();
        let now = Utc::now();
        for (i, e) in [0.2, 0.95, 0.97].iter().enumerate() {
            let mut ev = event(
                FileOperation::Modify,
                &format!("/d/f{i}.bin"),
                now - Duration::seconds(1),
            );
            ev.metadata = Some(EventMetadata {
                entropy: Some(*e),
                ..Default::default()
            });
            x.observe(&ev);
        }
        let snap = x.snapshot_at("worker:7", now);
        assert_eq!(snap.entropy_samples.len(), 3);
        assert_eq!(snap.high_entropy_count, 2);
        assert!((snap.avg_entropy - 0.706_666).abs() < 1e-3);
    }
}
