//! Normalizes raw source notifications into canonical events. Malformed
//! events are rejected here and never reach the extractor; anything under
//! the backup tree is filtered out to avoid feedback loops with the backup
//! executor.

use super::{EventMetadata, FileActivityEvent, FileOperation, ProcessInfo, RawFileEvent};
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MalformedEventError {
    #[error("event has an empty path")]
    MissingPath,
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),
    #[error("event for {0} carries no process metadata")]
    MissingProcess(String),
    #[error("event for {0} has process pid 0")]
    MissingPid(String),
    #[error("path {0} is inside the backup tree")]
    BackupPath(String),
    #[error("path {0} is a detector log file")]
    LogFile(String),
}

pub struct EventAdapter {
    backup_root: PathBuf,
    log_files: Vec<PathBuf>,
}

impl EventAdapter {
    pub fn new(backup_root: PathBuf, log_files: Vec<PathBuf>) -> Self {
        Self {
            backup_root,
            log_files,
        }
    }

    /// Validate and normalize one raw event.
    pub fn ingest(&self, raw: RawFileEvent) -> Result<FileActivityEvent, MalformedEventError> {
        if raw.path.is_empty() {
            return Err(MalformedEventError::MissingPath);
        }
        let operation = match raw.operation.as_deref() {
            Some("create") => FileOperation::Create,
            Some("modify") | Some("write") => FileOperation::Modify,
            Some("delete") => FileOperation::Delete,
            Some("rename") => FileOperation::Rename,
            Some("permission_change") => FileOperation::PermissionChange,
            other => {
                return Err(MalformedEventError::UnknownOperation(
                    other.unwrap_or("").to_string(),
                ))
            }
        };
        let process = raw
            .process
            .ok_or_else(|| MalformedEventError::MissingProcess(raw.path.clone()))?;
        if process.pid == 0 {
            return Err(MalformedEventError::MissingPid(raw.path.clone()));
        }
        if self.is_backup_path(Path::new(&raw.path)) {
            return Err(MalformedEventError::BackupPath(raw.path));
        }
        if self.is_log_file(Path::new(&raw.path)) {
            return Err(MalformedEventError::LogFile(raw.path));
        }

        let metadata = normalize_metadata(operation, &raw.path, raw.metadata);
        Ok(FileActivityEvent::new(
            raw.path,
            operation,
            raw.timestamp.unwrap_or_else(Utc::now),
            process,
            metadata,
        ))
    }

    /// True for the configured backup root and for any `backup_`-style path
    /// component, so foreign quarantine trees are filtered too.
    pub fn is_backup_path(&self, path: &Path) -> bool {
        if path.starts_with(&self.backup_root) {
            return true;
        }
        path.components().any(|c| match c {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                name.starts_with("backup_") || name.contains("_backup")
            }
            _ => false,
        })
    }

    fn is_log_file(&self, path: &Path) -> bool {
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

/// Renames derive old/new paths when the source did not fill them in.
fn normalize_metadata(
    operation: FileOperation,
    path: &str,
    metadata: Option<EventMetadata>,
) -> Option<EventMetadata> {
    let mut metadata = metadata;
    if operation == FileOperation::Rename {
        let m = metadata.get_or_insert_with(EventMetadata::default);
        if m.new_path.is_none() {
            m.new_path = Some(path.to_string());
        }
    }
    metadata
}

/// Fallback attribution for sources that cannot see the acting process:
/// the detector reports activity under its own identity, the same way the
/// original monitor stamped events with its DetectorPID.
pub(super) fn self_process_info() -> ProcessInfo {
    ProcessInfo {
        name: "ransomguard-agent".to_string(),
        pid: std::process::id(),
        executable_path: std::env::current_exe()
            .ok()
            .map(|p| p.display().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> EventAdapter {
        EventAdapter::new(
            PathBuf::from("/data/_detector_backups"),
            vec![PathBuf::from("ransomware_detection.log")],
        )
    }

    fn raw(path: &str, op: &str) -> RawFileEvent {
        RawFileEvent {
            path: path.to_string(),
            operation: Some(op.to_string()),
            timestamp: None,
            process: Some(ProcessInfo {
                name: "editor".into(),
                pid: 4242,
                executable_path: None,
            }),
            metadata: None,
        }
    }

    #[test]
    fn ingest_normalizes_a_valid_event() {
        let ev = adapter().ingest(raw("/data/docs/a.txt", "modify")).unwrap();
        assert_eq!(ev.operation, FileOperation::Modify);
        assert_eq!(ev.process.pid, 4242);
    }

    #[test]
    fn backup_tree_events_are_rejected() {
        let err = adapter()
            .ingest(raw("/data/_detector_backups/backup_20240101/a.txt", "create"))
            .unwrap_err();
        assert!(matches!(err, MalformedEventError::BackupPath(_)));

        // foreign backup-style components are filtered too
        let err = adapter()
            .ingest(raw("/other/backup_misc/b.txt", "create"))
            .unwrap_err();
        assert!(matches!(err, MalformedEventError::BackupPath(_)));
    }

    #[test]
    fn events_without_pid_are_rejected() {
        let mut r = raw("/data/docs/a.txt", "create");
        r.process.as_mut().unwrap().pid = 0;
        assert!(matches!(
            adapter().ingest(r),
            Err(MalformedEventError::MissingPid(_))
        ));
    }

    #[test]
    fn rename_gets_new_path_metadata() {
        let mut r = raw("/data/docs/a.locked", "rename");
        r.metadata = Some(EventMetadata {
            old_path: Some("/data/docs/a.txt".into()),
            ..Default::default()
        });
        let ev = adapter().ingest(r).unwrap();
        let m = ev.metadata.unwrap();
        assert_eq!(m.new_path.as_deref(), Some("/data/docs/a.locked"));
        assert_eq!(m.old_path.as_deref(), Some("/data/docs/a.txt"));
    }
}
