//! Threat scoring: converts a feature snapshot into an assessment. The
//! dispatcher is strategy-agnostic; strategies are selected once from
//! configuration and share one trait.

mod inference;
mod rules;

pub use inference::InferenceScorer;
pub use rules::RuleBasedScorer;

use crate::config::{ScoringConfig, ScoringStrategyKind};
use crate::features::FeatureSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    None,
    SuspiciousProcess,
    FileEncryption,
    NetworkActivity,
    AiDetected,
}

/// Actions a scorer or the dispatcher can recommend. Rendered with the
/// operator-facing wording the dashboard displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    TerminateProcess,
    IsolateNetwork,
    CreateSnapshot,
    ScanForMalware,
    MonitorProcess,
    BackupFiles,
}

impl ActionKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ActionKind::TerminateProcess => "Terminate and block the suspicious process",
            ActionKind::IsolateNetwork => "Isolate affected system from network",
            ActionKind::CreateSnapshot => "Create system snapshot for recovery",
            ActionKind::ScanForMalware => "Scan for additional malware",
            ActionKind::MonitorProcess => "Monitor the process for additional suspicious activity",
            ActionKind::BackupFiles => "Backup important files as a precaution",
        }
    }
}

/// One scoring result. Created once per invocation, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub threat_detected: bool,
    /// Accumulated confidence in [0, 1]
    pub confidence: f64,
    pub category: ThreatCategory,
    /// Ordered rule evidence, strongest signal first
    pub evidence: Vec<String>,
    pub recommended_actions: BTreeSet<ActionKind>,
}

impl ThreatAssessment {
    pub fn benign() -> Self {
        Self {
            threat_detected: false,
            confidence: 0.0,
            category: ThreatCategory::None,
            evidence: Vec::new(),
            recommended_actions: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("inference call timed out after {0}s")]
    Timeout(u64),
    #[error("inference transport: {0}")]
    Transport(String),
    #[error("inference returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Every strategy scores the same way; callers never branch on which one
/// is behind the trait object.
pub trait ScoringStrategy: Send + Sync {
    fn score(&self, snapshot: &FeatureSnapshot) -> ThreatAssessment;
    fn name(&self) -> &'static str;
}

/// Resolve the configured strategy once at startup.
pub fn build_strategy(
    scoring: &ScoringConfig,
    rules: &crate::config::RulesConfig,
) -> Arc<dyn ScoringStrategy> {
    match scoring.strategy {
        ScoringStrategyKind::Rules => Arc::new(RuleBasedScorer::new(rules.clone())),
        ScoringStrategyKind::Inference => Arc::new(InferenceScorer::new(
            scoring.clone(),
            RuleBasedScorer::new(rules.clone()),
        )),
    }
}

/// Recommended-action set for a given confidence, shared by both strategies:
/// full containment above the detection threshold, watchful waiting in the
/// precautionary band.
pub(crate) fn actions_for_confidence(confidence: f64) -> BTreeSet<ActionKind> {
    let mut set = BTreeSet::new();
    if confidence >= 0.6 {
        set.insert(ActionKind::TerminateProcess);
        set.insert(ActionKind::IsolateNetwork);
        set.insert(ActionKind::CreateSnapshot);
        set.insert(ActionKind::ScanForMalware);
    } else if confidence >= 0.3 {
        set.insert(ActionKind::MonitorProcess);
        set.insert(ActionKind::BackupFiles);
    }
    set
}
