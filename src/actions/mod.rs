//! Action executors: process blocking and file backup. Each capability is a
//! narrow trait with its own failure domain; the dispatcher only ever sees
//! the result contract, never a concrete executor.

mod backup;
mod process;
mod runner;

pub use backup::BackupManager;
pub use process::{SimulatedProcessBlocker, SystemProcessBlocker};
pub use runner::ActionRunner;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("process {0} not found")]
    ProcessNotFound(u32),
    #[error("access denied acting on process {0}")]
    AccessDenied(u32),
    #[error("backup already in progress")]
    BackupInProgress,
    #[error("backup cancelled")]
    Cancelled,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockMethod {
    Terminated,
    Killed,
    /// The pid was blocked earlier; calling again is success, not error
    AlreadyBlocked,
    /// Recorded without touching the process (demo deployments)
    Simulated,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub pid: u32,
    pub name: String,
    pub method: BlockMethod,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupOutcome {
    pub target: PathBuf,
    pub copied_files: u64,
    pub copied_dirs: u64,
    pub skipped: u64,
    pub duration_secs: f64,
}

/// Terminate/isolate a process. Idempotent: re-blocking an already-blocked
/// pid returns success without a second action record.
pub trait ProcessBlocker: Send + Sync {
    fn block(&self, pid: u32, name: &str, reason: &str) -> Result<ActionOutcome, ActionError>;
    /// Action records, one per distinct block
    fn history(&self) -> Vec<ActionOutcome>;
}

/// Copy the monitored tree to a timestamped target, never recursing into
/// the backup tree itself.
pub trait BackupExecutor: Send + Sync {
    fn run(&self) -> Result<BackupOutcome, ActionError>;
    /// Request cooperative cancellation of an in-flight run
    fn cancel(&self);
    /// True when the periodic interval has elapsed since the last success
    fn due(&self, interval: std::time::Duration) -> bool;
}
