//! Event sources: file-system watch, on-demand scan, simulation feed.
//! Raw notifications are normalized into canonical events by the adapter;
//! everything downstream consumes only the canonical form.

mod adapter;
mod scanner;
mod watcher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use adapter::{EventAdapter, MalformedEventError};
pub use scanner::{DirectoryScanner, ScanIssue, ScanReport};
pub use watcher::FsWatchSource;

/// Canonical file-activity event. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileActivityEvent {
    pub id: String,
    pub path: String,
    pub operation: FileOperation,
    pub timestamp: DateTime<Utc>,
    pub process: ProcessInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    Create,
    Modify,
    Delete,
    Rename,
    PermissionChange,
}

/// Process responsible for an event, as far as the source can attribute it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Normalized Shannon entropy of sampled content, in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
}

/// Unvalidated event as produced by a source (watcher, simulation, API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFileEvent {
    pub path: String,
    pub operation: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub process: Option<ProcessInfo>,
    #[serde(default)]
    pub metadata: Option<EventMetadata>,
}

impl FileActivityEvent {
    pub fn new(
        path: String,
        operation: FileOperation,
        timestamp: DateTime<Utc>,
        process: ProcessInfo,
        metadata: Option<EventMetadata>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            path,
            operation,
            timestamp,
            process,
            metadata,
        }
    }

    /// Stable identity used for incident grouping: name + pid.
    pub fn process_identity(&self) -> String {
        format!("{}:{}", self.process.name, self.process.pid)
    }
}
