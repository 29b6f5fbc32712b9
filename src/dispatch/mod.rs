//! Decision layer: turns assessments into alerts, malicious-file records,
//! and action requests. Exclusive owner of alert and registry state.

mod dispatcher;

pub use dispatcher::{DispatchOutcome, Dispatcher};

use crate::scoring::ActionKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Investigating,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousProcess {
    pub pid: u32,
    pub name: String,
    pub reason: String,
}

/// Operator-facing alert. Created only by the dispatcher; status moves
/// Active -> Investigating -> Resolved (or straight to Resolved) and
/// Resolved is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    /// Stable incident signature; identical details within the dedup
    /// window suppress re-emission
    pub details: String,
    pub evidence: Vec<String>,
    pub affected_files: BTreeSet<String>,
    pub suspicious_processes: Vec<SuspiciousProcess>,
    pub recommended_actions: BTreeSet<ActionKind>,
}

/// Append-only registry entry, keyed by path; first sighting wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaliciousFileRecord {
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Work handed to the action executors. The dispatcher never calls an
/// executor directly.
#[derive(Debug, Clone)]
pub enum ActionRequest {
    BlockProcess {
        pid: u32,
        name: String,
        reason: String,
    },
    Backup,
}
