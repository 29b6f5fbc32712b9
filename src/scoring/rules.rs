//! Rule-based scoring: additive weights over window aggregates, capped.
//! The default strategy, and the fallback for the inference strategy.

use super::{actions_for_confidence, ScoringStrategy, ThreatAssessment, ThreatCategory};
use crate::config::RulesConfig;
use crate::features::FeatureSnapshot;

/// Extensions ransomware families rename victims' files to.
const RANSOMWARE_EXTENSIONS: &[&str] = &[
    "locked", "encrypt", "crypted", "crypt", "crypto", "pay", "ransom", "vault", "wcry", "wncry",
    "wncryt", "encrypted", "enc", "crab", "thor", "thanos", "lock", "sage", "crinf",
];

/// Fragments in a process name that mark it suspicious on their own.
const SUSPECT_PROCESS_FRAGMENTS: &[&str] =
    &["ransom", "crypt", "locker", "lock", "encrypt", "decrypt"];

/// File names ransom notes are dropped under.
const RANSOM_NOTE_KEYWORDS: &[&str] = &[
    "DECRYPT",
    "RANSOM",
    "RECOVER",
    "README",
    "HELP",
    "INSTRUCTION",
    "_RECOVERY_",
    "RESTORE",
];

pub struct RuleBasedScorer {
    config: RulesConfig,
}

impl RuleBasedScorer {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }
}

impl ScoringStrategy for RuleBasedScorer {
    fn score(&self, snapshot: &FeatureSnapshot) -> ThreatAssessment {
        let cfg = &self.config;
        let mut confidence = 0.0;
        let mut evidence = Vec::new();
        let mut category = ThreatCategory::None;

        let burst_window_ms = (cfg.write_burst_window_secs * 1000) as i64;
        if snapshot.modify_count > cfg.write_burst_count && snapshot.timespan_ms < burst_window_ms {
            confidence += cfg.write_burst_weight;
            category = ThreatCategory::FileEncryption;
            evidence.push(format!(
                "High volume of write operations in a short time period ({} writes in {:.1}s)",
                snapshot.modify_count,
                snapshot.timespan_ms as f64 / 1000.0
            ));
        }

        if snapshot.extension_changes.len() as u32 > cfg.extension_change_count {
            confidence += cfg.extension_change_weight;
            category = ThreatCategory::FileEncryption;
            let known = snapshot
                .extension_changes
                .iter()
                .filter(|c| is_ransomware_extension(&c.to))
                .count();
            evidence.push(format!(
                "Multiple file extension changes detected ({} total, {} to known ransomware extensions)",
                snapshot.extension_changes.len(),
                known
            ));
        }

        if snapshot.high_entropy_count > cfg.high_entropy_count {
            confidence += cfg.high_entropy_weight;
            category = ThreatCategory::FileEncryption;
            evidence.push(format!(
                "Multiple high-entropy write operations detected ({} writes, avg entropy {:.2})",
                snapshot.high_entropy_count, snapshot.avg_entropy
            ));
        }

        let name = snapshot.process_name.to_lowercase();
        if SUSPECT_PROCESS_FRAGMENTS.iter().any(|f| name.contains(f)) {
            confidence += cfg.process_name_weight;
            if category == ThreatCategory::None {
                category = ThreatCategory::SuspiciousProcess;
            }
            evidence.push(format!("Suspicious process name: {}", snapshot.process_name));
        }

        if let Some(note) = snapshot.created_names.iter().find(|n| is_ransom_note(n)) {
            confidence = confidence.max(cfg.ransom_note_floor);
            category = ThreatCategory::FileEncryption;
            evidence.insert(0, format!("Ransom note created: {note}"));
        }

        let threat_detected = !evidence.is_empty();
        let confidence = if threat_detected {
            confidence.min(cfg.confidence_cap)
        } else {
            0.0
        };

        ThreatAssessment {
            threat_detected,
            confidence,
            category,
            evidence,
            recommended_actions: actions_for_confidence(confidence),
        }
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

fn is_ransomware_extension(ext: &str) -> bool {
    let ext = ext.to_lowercase();
    RANSOMWARE_EXTENSIONS.iter().any(|known| ext.contains(known))
}

fn is_ransom_note(file_name: &str) -> bool {
    let upper = file_name.to_uppercase();
    RANSOM_NOTE_KEYWORDS.iter().any(|k| upper.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ExtensionChange;
    use crate::scoring::ActionKind;

    fn scorer() -> RuleBasedScorer {
        RuleBasedScorer::new(RulesConfig::default())
    }

    fn snapshot(name: &str) -> FeatureSnapshot {
        FeatureSnapshot {
            process_identity: format!("{name}:99"),
            process_name: name.to_string(),
            pid: 99,
            ..Default::default()
        }
    }

    #[test]
    fn write_burst_within_a_minute_triggers() {
        let mut snap = snapshot("svchost");
        snap.modify_count = 51;
        snap.timespan_ms = 59_000;
        let a = scorer().score(&snap);
        assert!(a.threat_detected);
        assert!(a.confidence >= 0.3);
        assert_eq!(a.category, ThreatCategory::FileEncryption);
    }

    #[test]
    fn slow_writes_do_not_trigger() {
        let mut snap = snapshot("svchost");
        snap.modify_count = 51;
        snap.timespan_ms = 120_000;
        let a = scorer().score(&snap);
        assert!(!a.threat_detected);
        assert_eq!(a.confidence, 0.0);
    }

    #[test]
    fn ransomware_extension_changes_add_their_weight() {
        let mut snap = snapshot("svchost");
        for ext in ["locked", "encrypted", "crypt"].iter().cycle().take(11) {
            snap.extension_changes.push(ExtensionChange {
                from: "txt".into(),
                to: (*ext).into(),
            });
        }
        let a = scorer().score(&snap);
        assert!(a.threat_detected);
        assert!(a.confidence >= 0.4);
        assert_eq!(a.category, ThreatCategory::FileEncryption);
        assert!(a.evidence[0].contains("11 total, 11 to known ransomware extensions"));
    }

    #[test]
    fn confidence_is_capped() {
        let mut snap = snapshot("cryptolocker");
        snap.modify_count = 200;
        snap.timespan_ms = 5_000;
        snap.high_entropy_count = 40;
        for _ in 0..20 {
            snap.extension_changes.push(ExtensionChange {
                from: "doc".into(),
                to: "locked".into(),
            });
        }
        let a = scorer().score(&snap);
        assert!(a.confidence <= 0.95);
        assert!(a.recommended_actions.contains(&ActionKind::TerminateProcess));
        assert!(a.recommended_actions.contains(&ActionKind::IsolateNetwork));
    }

    #[test]
    fn ransom_note_creation_floors_confidence_at_critical() {
        let mut snap = snapshot("explorer");
        snap.created_names.push("HOW_TO_DECRYPT_FILES.txt".into());
        let a = scorer().score(&snap);
        assert!(a.threat_detected);
        assert!(a.confidence >= 0.85);
        assert_eq!(a.category, ThreatCategory::FileEncryption);
        assert!(a.evidence[0].starts_with("Ransom note created"));
    }

    #[test]
    fn precautionary_band_recommends_monitoring_and_backup() {
        let mut snap = snapshot("svchost");
        snap.modify_count = 51;
        snap.timespan_ms = 30_000;
        let a = scorer().score(&snap);
        assert_eq!(a.confidence, 0.3);
        assert!(a.recommended_actions.contains(&ActionKind::MonitorProcess));
        assert!(a.recommended_actions.contains(&ActionKind::BackupFiles));
    }

    #[test]
    fn benign_snapshot_scores_zero() {
        let a = scorer().score(&snapshot("emacs"));
        assert!(!a.threat_detected);
        assert_eq!(a.category, ThreatCategory::None);
        assert!(a.recommended_actions.is_empty());
    }
}
