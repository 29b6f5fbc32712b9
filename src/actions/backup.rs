//! Backup executor: copies the monitored tree into a timestamped directory
//! under the backup root, never descending into the backup tree itself and
//! never copying the detector's log files. One run at a time; a second
//! request while a run is active is skipped, not queued.

use super::{ActionError, BackupExecutor, BackupOutcome};
use crate::logging::DetectorLog;
use chrono::Local;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;
use walkdir::WalkDir;

pub struct BackupManager {
    monitored: PathBuf,
    backup_root: PathBuf,
    log_files: Vec<PathBuf>,
    /// Grammar lines ([BACKUP_START]/[BACKUP_END]) go here when present
    log: Option<Arc<DetectorLog>>,
    run_guard: Mutex<()>,
    cancel: AtomicBool,
    last_success: Mutex<Option<Instant>>,
}

impl BackupManager {
    pub fn new(
        monitored: PathBuf,
        backup_root: PathBuf,
        log_files: Vec<PathBuf>,
        log: Option<Arc<DetectorLog>>,
    ) -> Self {
        Self {
            monitored,
            backup_root,
            log_files,
            log,
            run_guard: Mutex::new(()),
            cancel: AtomicBool::new(false),
            last_success: Mutex::new(None),
        }
    }

    fn is_log_file(&self, path: &std::path::Path) -> bool {
        self.log_files.iter().any(|l| {
            path == l
                || path
                    .file_name()
                    .zip(l.file_name())
                    .map(|(a, b)| a == b)
                    .unwrap_or(false)
        })
    }
}

impl BackupExecutor for BackupManager {
    fn run(&self) -> Result<BackupOutcome, ActionError> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            return Err(ActionError::BackupInProgress);
        };
        self.cancel.store(false, Ordering::Relaxed);

        let start = Instant::now();
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let target = self.backup_root.join(format!("backup_{stamp}"));
        std::fs::create_dir_all(&target)?;
        if let Some(log) = &self.log {
            log.backup_start(&target.display().to_string());
        }

        let mut copied_files = 0u64;
        let mut copied_dirs = 0u64;
        let mut skipped = 0u64;

        for entry in WalkDir::new(&self.monitored)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !e.path().starts_with(&self.backup_root))
            .filter_map(|e| e.ok())
        {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(ActionError::Cancelled);
            }
            let src = entry.path();
            let rel = match src.strip_prefix(&self.monitored) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let dest = target.join(rel);
            if src.is_dir() {
                if !dest.exists() {
                    if let Err(e) = std::fs::create_dir_all(&dest) {
                        warn!(dir = %dest.display(), error = %e, "backup dir create failed");
                        continue;
                    }
                    if !rel.as_os_str().is_empty() {
                        copied_dirs += 1;
                    }
                }
                continue;
            }
            if self.is_log_file(src) {
                skipped += 1;
                continue;
            }
            match std::fs::copy(src, &dest) {
                Ok(_) => copied_files += 1,
                Err(e) => {
                    warn!(file = %src.display(), error = %e, "backup copy failed");
                    skipped += 1;
                }
            }
        }

        *self.last_success.lock().expect("backup state lock") = Some(Instant::now());
        let outcome = BackupOutcome {
            target,
            copied_files,
            copied_dirs,
            skipped,
            duration_secs: start.elapsed().as_secs_f64(),
        };
        if let Some(log) = &self.log {
            log.backup_end(
                outcome.duration_secs,
                outcome.copied_files,
                outcome.copied_dirs,
                outcome.skipped,
                &outcome.target.display().to_string(),
            );
        }
        Ok(outcome)
    }

    fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn due(&self, interval: Duration) -> bool {
        match *self.last_success.lock().expect("backup state lock") {
            Some(t) => t.elapsed() >= interval,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, BackupManager) {
        let dir = tempfile::tempdir().unwrap();
        let monitored = dir.path().join("docs");
        let backup_root = monitored.join("_detector_backups");
        std::fs::create_dir_all(monitored.join("sub")).unwrap();
        std::fs::write(monitored.join("a.txt"), "alpha").unwrap();
        std::fs::write(monitored.join("sub/b.txt"), "beta").unwrap();
        std::fs::write(monitored.join("ransomware_detection.log"), "log").unwrap();
        let mgr = BackupManager::new(
            monitored,
            backup_root,
            vec![PathBuf::from("ransomware_detection.log")],
            None,
        );
        (dir, mgr)
    }

    #[test]
    fn backup_copies_tree_and_skips_logs() {
        let (_dir, mgr) = setup();
        let out = mgr.run().unwrap();
        assert_eq!(out.copied_files, 2);
        assert_eq!(out.copied_dirs, 1);
        assert_eq!(out.skipped, 1);
        assert!(out.target.join("a.txt").exists());
        assert!(out.target.join("sub/b.txt").exists());
        assert!(!out.target.join("ransomware_detection.log").exists());
    }

    #[test]
    fn second_run_does_not_recurse_into_first_backup() {
        let (_dir, mgr) = setup();
        let first = mgr.run().unwrap();
        // wait for a distinct timestamped target
        std::thread::sleep(Duration::from_millis(1100));
        let second = mgr.run().unwrap();
        assert_ne!(first.target, second.target);
        // same source set both times: the first backup's copies were not re-copied
        assert_eq!(second.copied_files, 2);
        assert!(!second
            .target
            .join("_detector_backups")
            .exists());
    }

    #[test]
    fn due_respects_interval() {
        let (_dir, mgr) = setup();
        assert!(mgr.due(Duration::from_secs(300)));
        mgr.run().unwrap();
        assert!(!mgr.due(Duration::from_secs(300)));
        assert!(mgr.due(Duration::from_millis(0)));
    }
}
