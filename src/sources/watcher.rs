//! Real-time file-system watch source (inotify/FSEvents/ReadDirectoryChanges
//! via `notify`). Raw OS notifications are mapped to `RawFileEvent`s and
//! pushed into the ordered ingestion queue; the pipeline worker owns all
//! further interpretation.

use super::adapter::self_process_info;
use super::{EventMetadata, ProcessInfo, RawFileEvent};
use crate::config::FeaturesConfig;
use crate::features::calculate_entropy;
use chrono::Utc;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sysinfo::System;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Process names matching these fragments are attributed as the likely actor
/// when the OS notification itself carries no process identity.
const SUSPECT_NAME_FRAGMENTS: &[&str] = &["ransom", "crypt", "locker", "lock", "encrypt", "decrypt"];

const ATTRIBUTION_REFRESH: Duration = Duration::from_secs(2);

pub struct FsWatchSource {
    running: Arc<AtomicBool>,
}

impl FsWatchSource {
    /// Start watching `root` recursively. Events flow into `queue` until the
    /// source is stopped or the queue closes.
    pub fn start(
        root: &Path,
        features: FeaturesConfig,
        queue: mpsc::Sender<RawFileEvent>,
    ) -> Result<Self, notify::Error> {
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = std::sync::mpsc::channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!(path = %root.display(), "file-system watch started");

        let thread_running = running.clone();
        let attributor = ProcessAttributor::new();
        std::thread::Builder::new()
            .name("fs-watch-recv".into())
            .spawn(move || {
                // the watcher must live as long as the receiver
                let _watcher = watcher;
                while thread_running.load(Ordering::Relaxed) {
                    match rx.recv_timeout(Duration::from_millis(500)) {
                        Ok(event) => {
                            for raw in map_event(&event, &features, &attributor) {
                                if queue.blocking_send(raw).is_err() {
                                    return; // pipeline gone
                                }
                            }
                        }
                        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("fs-watch receiver exiting");
            })
            .expect("spawn fs-watch thread");

        Ok(Self { running })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for FsWatchSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map one notify event to zero or more raw events.
fn map_event(
    event: &Event,
    features: &FeaturesConfig,
    attributor: &ProcessAttributor,
) -> Vec<RawFileEvent> {
    use notify::event::{ModifyKind, RenameMode};

    let mut out = Vec::new();
    match &event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                out.push(raw(path, "create", content_metadata(path, features), attributor));
            }
        }
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            for path in &event.paths {
                out.push(raw(path, "modify", content_metadata(path, features), attributor));
            }
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => {
            for path in &event.paths {
                out.push(raw(path, "permission_change", None, attributor));
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let old = event.paths[0].display().to_string();
            let new = &event.paths[1];
            let mut metadata = content_metadata(new, features).unwrap_or_default();
            metadata.old_path = Some(old);
            metadata.new_path = Some(new.display().to_string());
            out.push(raw(new, "rename", Some(metadata), attributor));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in &event.paths {
                out.push(raw(path, "create", content_metadata(path, features), attributor));
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                out.push(raw(path, "delete", None, attributor));
            }
        }
        _ => {}
    }
    out
}

fn raw(
    path: &Path,
    operation: &str,
    metadata: Option<EventMetadata>,
    attributor: &ProcessAttributor,
) -> RawFileEvent {
    RawFileEvent {
        path: path.display().to_string(),
        operation: Some(operation.to_string()),
        timestamp: Some(Utc::now()),
        process: Some(attributor.attribute()),
        metadata,
    }
}

/// Sample the file's size and entropy. Failures are fine; the event just
/// carries no content metadata.
fn content_metadata(path: &Path, features: &FeaturesConfig) -> Option<EventMetadata> {
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    let mut buf = vec![0u8; features.entropy_sample_bytes.min(meta.len() as usize)];
    let entropy = std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut buf).map(|_| ()))
        .ok()
        .map(|_| calculate_entropy(&buf));
    Some(EventMetadata {
        file_size: Some(meta.len()),
        entropy,
        ..Default::default()
    })
}

/// Best-effort process attribution. OS file notifications do not identify
/// the acting process, so this scans the process table for names matching
/// known ransomware fragments and otherwise falls back to the detector's
/// own identity.
struct ProcessAttributor {
    sys: Mutex<(System, Instant)>,
}

impl ProcessAttributor {
    fn new() -> Self {
        Self {
            sys: Mutex::new((System::new_all(), Instant::now())),
        }
    }

    fn attribute(&self) -> ProcessInfo {
        let mut guard = match self.sys.lock() {
            Ok(g) => g,
            Err(_) => return self_process_info(),
        };
        if guard.1.elapsed() >= ATTRIBUTION_REFRESH {
            guard.0.refresh_processes();
            guard.1 = Instant::now();
        }
        let own_pid = std::process::id();
        for (pid, proc_) in guard.0.processes() {
            let name = proc_.name().to_lowercase();
            if pid.as_u32() != own_pid
                && SUSPECT_NAME_FRAGMENTS.iter().any(|frag| name.contains(frag))
            {
                return ProcessInfo {
                    name: proc_.name().to_string(),
                    pid: pid.as_u32(),
                    executable_path: proc_.exe().map(|p| p.display().to_string()),
                };
            }
        }
        self_process_info()
    }
}
