//! Alert emission with dedup, severity mapping, auto-action policy, and the
//! terminal-resolve state machine.

use super::{
    ActionRequest, Alert, AlertSeverity, AlertStatus, MaliciousFileRecord, SuspiciousProcess,
};
use crate::config::DispatchConfig;
use crate::features::FeatureSnapshot;
use crate::scoring::{ThreatAssessment, ThreatCategory};
use crate::storage::AlertStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct DispatchOutcome {
    pub alert: Option<Alert>,
    pub actions: Vec<ActionRequest>,
    /// True when an identical incident was already alerted inside the window
    pub suppressed: bool,
}

#[derive(Default)]
struct DispatchState {
    alerts: Vec<Alert>,
    /// details text -> last emission time
    recent_details: HashMap<String, DateTime<Utc>>,
    registry: Vec<MaliciousFileRecord>,
    registry_paths: HashSet<String>,
}

pub struct Dispatcher {
    config: DispatchConfig,
    state: Mutex<DispatchState>,
    store: Option<Arc<AlertStore>>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, store: Option<Arc<AlertStore>>) -> Self {
        Self {
            config,
            state: Mutex::new(DispatchState::default()),
            store,
        }
    }

    /// Decide on one assessment. No alert below the emission floor; identical
    /// details inside the dedup window suppress; auto-block above the
    /// configured confidence for encryption-class categories.
    pub fn dispatch(
        &self,
        assessment: &ThreatAssessment,
        snapshot: &FeatureSnapshot,
    ) -> DispatchOutcome {
        self.dispatch_at(assessment, snapshot, Utc::now())
    }

    pub fn dispatch_at(
        &self,
        assessment: &ThreatAssessment,
        snapshot: &FeatureSnapshot,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        if !assessment.threat_detected || assessment.confidence < self.config.alert_floor {
            return DispatchOutcome {
                alert: None,
                actions: Vec::new(),
                suppressed: false,
            };
        }

        let severity = self.severity_for(assessment.confidence);
        let category_label = category_label(assessment.category);
        let details = format!(
            "{} detected for process {} (PID {})",
            category_label, snapshot.process_name, snapshot.pid
        );

        let auto_block = assessment.confidence > self.config.auto_block_confidence
            && matches!(
                assessment.category,
                ThreatCategory::FileEncryption | ThreatCategory::AiDetected
            );
        let reason = assessment
            .evidence
            .first()
            .cloned()
            .unwrap_or_else(|| details.clone());

        let mut state = self.state.lock().expect("dispatch lock");
        // registry updates are keyed by path, not incident: an ongoing
        // incident keeps registering newly touched files even while its
        // alert is deduplicated
        let new_records = record_paths(&mut state, &snapshot.affected_paths, &reason, now);

        let window = Duration::seconds(self.config.dedup_window_secs as i64);
        state.recent_details.retain(|_, t| now - *t < window);
        if state.recent_details.contains_key(&details) {
            // an incident that grew past its previous severity escalates the
            // existing alert in place; anything else is a duplicate
            let escalated = state
                .alerts
                .iter_mut()
                .rev()
                .find(|a| a.details == details && a.status == AlertStatus::Active)
                .filter(|a| severity > a.severity)
                .map(|a| {
                    a.severity = severity;
                    a.evidence = assessment.evidence.clone();
                    a.recommended_actions = assessment.recommended_actions.clone();
                    a.suspicious_processes = vec![SuspiciousProcess {
                        pid: snapshot.pid,
                        name: snapshot.process_name.clone(),
                        reason: reason.clone(),
                    }];
                    a.affected_files
                        .extend(snapshot.affected_paths.iter().cloned());
                    a.clone()
                });
            drop(state);
            self.persist_records(&new_records);

            let Some(alert) = escalated else {
                debug!(details = %details, "duplicate incident suppressed");
                return DispatchOutcome {
                    alert: None,
                    actions: Vec::new(),
                    suppressed: true,
                };
            };
            self.persist(&alert);

            let mut actions = Vec::new();
            if auto_block {
                actions.push(ActionRequest::BlockProcess {
                    pid: snapshot.pid,
                    name: snapshot.process_name.clone(),
                    reason,
                });
            }
            if severity == AlertSeverity::Critical || auto_block {
                actions.push(ActionRequest::Backup);
            }
            return DispatchOutcome {
                alert: Some(alert),
                actions,
                suppressed: false,
            };
        }
        state.recent_details.insert(details.clone(), now);

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            kind: category_label.to_string(),
            message: format!("Ransomware behavior: {category_label}"),
            timestamp: now,
            severity,
            status: AlertStatus::Active,
            details,
            evidence: assessment.evidence.clone(),
            affected_files: snapshot.affected_paths.iter().cloned().collect(),
            suspicious_processes: vec![SuspiciousProcess {
                pid: snapshot.pid,
                name: snapshot.process_name.clone(),
                reason: reason.clone(),
            }],
            recommended_actions: assessment.recommended_actions.clone(),
        };

        state.alerts.push(alert.clone());
        drop(state);
        self.persist(&alert);
        self.persist_records(&new_records);

        let mut actions = Vec::new();
        if auto_block {
            actions.push(ActionRequest::BlockProcess {
                pid: snapshot.pid,
                name: snapshot.process_name.clone(),
                reason,
            });
        }
        // a critical incident or a performed block warrants an immediate backup
        if severity == AlertSeverity::Critical || auto_block {
            actions.push(ActionRequest::Backup);
        }

        DispatchOutcome {
            alert: Some(alert),
            actions,
            suppressed: false,
        }
    }

    /// Action-executor failures become system alerts, distinct from threat
    /// alerts and always high severity.
    pub fn system_alert(&self, message: String) -> Option<Alert> {
        let now = Utc::now();
        let mut state = self.state.lock().expect("dispatch lock");
        let window = Duration::seconds(self.config.dedup_window_secs as i64);
        state.recent_details.retain(|_, t| now - *t < window);
        if state.recent_details.contains_key(&message) {
            return None;
        }
        state.recent_details.insert(message.clone(), now);
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            kind: "system".to_string(),
            message: message.clone(),
            timestamp: now,
            severity: AlertSeverity::High,
            status: AlertStatus::Active,
            details: message,
            evidence: Vec::new(),
            affected_files: Default::default(),
            suspicious_processes: Vec::new(),
            recommended_actions: Default::default(),
        };
        state.alerts.push(alert.clone());
        drop(state);
        self.persist(&alert);
        Some(alert)
    }

    /// Active -> Investigating. Anything else is left untouched.
    pub fn investigate(&self, alert_id: &str) -> bool {
        self.transition(alert_id, AlertStatus::Investigating)
    }

    /// Active/Investigating -> Resolved. Resolved is terminal: a second
    /// resolve is a silent no-op, tolerating duplicate requests.
    pub fn resolve(&self, alert_id: &str) -> bool {
        self.transition(alert_id, AlertStatus::Resolved)
    }

    fn transition(&self, alert_id: &str, to: AlertStatus) -> bool {
        let mut state = self.state.lock().expect("dispatch lock");
        let Some(alert) = state.alerts.iter_mut().find(|a| a.id == alert_id) else {
            return false;
        };
        let allowed = match (alert.status, to) {
            (AlertStatus::Active, AlertStatus::Investigating) => true,
            (AlertStatus::Active, AlertStatus::Resolved) => true,
            (AlertStatus::Investigating, AlertStatus::Resolved) => true,
            _ => false,
        };
        if !allowed {
            return false;
        }
        alert.status = to;
        let updated = alert.clone();
        drop(state);
        self.persist(&updated);
        true
    }

    /// Record a completed block on every alert naming the pid.
    pub fn annotate_blocked(&self, pid: u32) {
        let mut state = self.state.lock().expect("dispatch lock");
        for alert in state.alerts.iter_mut() {
            for proc_ in alert.suspicious_processes.iter_mut() {
                if proc_.pid == pid && !proc_.reason.ends_with("[BLOCKED]") {
                    proc_.reason = format!("{} [BLOCKED]", proc_.reason);
                }
            }
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.state.lock().expect("dispatch lock").alerts.clone()
    }

    pub fn malicious_files(&self) -> Vec<MaliciousFileRecord> {
        self.state.lock().expect("dispatch lock").registry.clone()
    }

    fn severity_for(&self, confidence: f64) -> AlertSeverity {
        if confidence >= 0.85 {
            AlertSeverity::Critical
        } else if confidence >= 0.6 {
            AlertSeverity::High
        } else if confidence >= self.config.alert_floor {
            AlertSeverity::Medium
        } else {
            AlertSeverity::Low
        }
    }

    fn persist(&self, alert: &Alert) {
        if let Some(store) = &self.store {
            if let Err(e) = store.upsert_alert(alert) {
                warn!(alert_id = %alert.id, error = %e, "alert persistence failed");
            }
        }
    }

    fn persist_records(&self, records: &[MaliciousFileRecord]) {
        if let Some(store) = &self.store {
            for record in records {
                if let Err(e) = store.insert_malicious_file(record) {
                    warn!(path = %record.path, error = %e, "registry persistence failed");
                }
            }
        }
    }
}

/// Register first sightings; already-known paths are left untouched.
fn record_paths(
    state: &mut DispatchState,
    paths: &[String],
    reason: &str,
    now: DateTime<Utc>,
) -> Vec<MaliciousFileRecord> {
    let mut new_records = Vec::new();
    for path in paths {
        if state.registry_paths.insert(path.clone()) {
            let record = MaliciousFileRecord {
                path: path.clone(),
                timestamp: now,
                reason: reason.to_string(),
            };
            state.registry.push(record.clone());
            new_records.push(record);
        }
    }
    new_records
}

fn category_label(category: ThreatCategory) -> &'static str {
    match category {
        ThreatCategory::None => "Unclassified activity",
        ThreatCategory::SuspiciousProcess => "Suspicious process activity",
        ThreatCategory::FileEncryption => "File encryption activity",
        ThreatCategory::NetworkActivity => "Suspicious network activity",
        ThreatCategory::AiDetected => "AI-detected malicious activity",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ActionKind;
    use std::collections::BTreeSet;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(DispatchConfig::default(), None)
    }

    fn assessment(confidence: f64, category: ThreatCategory) -> ThreatAssessment {
        ThreatAssessment {
            threat_detected: true,
            confidence,
            category,
            evidence: vec!["Multiple high-entropy write operations detected".into()],
            recommended_actions: BTreeSet::from([
                ActionKind::TerminateProcess,
                ActionKind::IsolateNetwork,
            ]),
        }
    }

    fn snapshot() -> FeatureSnapshot {
        FeatureSnapshot {
            process_identity: "ransom.exe:4321".into(),
            process_name: "ransom.exe".into(),
            pid: 4321,
            affected_paths: vec!["/d/a.txt".into(), "/d/b.txt".into()],
            ..Default::default()
        }
    }

    #[test]
    fn identical_incidents_emit_one_alert_within_the_window() {
        let d = dispatcher();
        let a = assessment(0.9, ThreatCategory::FileEncryption);
        let first = d.dispatch(&a, &snapshot());
        let second = d.dispatch(&a, &snapshot());
        assert!(first.alert.is_some());
        assert!(second.alert.is_none());
        assert!(second.suppressed);
        assert_eq!(d.alerts().len(), 1);
    }

    #[test]
    fn dedup_window_expiry_allows_reemission() {
        let d = dispatcher();
        let a = assessment(0.9, ThreatCategory::FileEncryption);
        let t0 = Utc::now();
        assert!(d.dispatch_at(&a, &snapshot(), t0).alert.is_some());
        let later = t0 + Duration::seconds(301);
        assert!(d.dispatch_at(&a, &snapshot(), later).alert.is_some());
    }

    #[test]
    fn growing_incident_escalates_in_place_instead_of_duplicating() {
        let d = dispatcher();
        let first = d.dispatch(&assessment(0.65, ThreatCategory::FileEncryption), &snapshot());
        assert_eq!(first.alert.as_ref().unwrap().severity, AlertSeverity::High);
        assert!(first.actions.is_empty());

        let second = d.dispatch(&assessment(0.95, ThreatCategory::FileEncryption), &snapshot());
        let escalated = second.alert.unwrap();
        assert_eq!(escalated.severity, AlertSeverity::Critical);
        assert_eq!(escalated.id, first.alert.unwrap().id);
        assert!(matches!(second.actions[0], ActionRequest::BlockProcess { .. }));
        assert_eq!(d.alerts().len(), 1);
    }

    #[test]
    fn resolved_is_terminal_and_resolve_is_idempotent() {
        let d = dispatcher();
        let out = d.dispatch(&assessment(0.9, ThreatCategory::FileEncryption), &snapshot());
        let id = out.alert.unwrap().id;

        assert!(d.investigate(&id));
        assert!(d.resolve(&id));
        // second resolve: silent no-op
        assert!(!d.resolve(&id));
        assert!(!d.investigate(&id));
        assert_eq!(d.alerts()[0].status, AlertStatus::Resolved);
    }

    #[test]
    fn high_confidence_encryption_auto_blocks_and_backs_up() {
        let d = dispatcher();
        let out = d.dispatch(&assessment(0.9, ThreatCategory::FileEncryption), &snapshot());
        assert!(matches!(
            out.actions[0],
            ActionRequest::BlockProcess { pid: 4321, .. }
        ));
        assert!(matches!(out.actions[1], ActionRequest::Backup));
        assert_eq!(out.alert.unwrap().severity, AlertSeverity::Critical);
    }

    #[test]
    fn medium_band_emits_without_actions() {
        let d = dispatcher();
        let out = d.dispatch(&assessment(0.4, ThreatCategory::SuspiciousProcess), &snapshot());
        let alert = out.alert.unwrap();
        assert_eq!(alert.severity, AlertSeverity::Medium);
        assert!(out.actions.is_empty());
    }

    #[test]
    fn below_floor_emits_nothing() {
        let d = dispatcher();
        let out = d.dispatch(&assessment(0.2, ThreatCategory::SuspiciousProcess), &snapshot());
        assert!(out.alert.is_none());
        assert!(!out.suppressed);
        assert!(d.malicious_files().is_empty());
    }

    #[test]
    fn registry_keeps_first_sighting_per_path() {
        let d = dispatcher();
        let a = assessment(0.9, ThreatCategory::FileEncryption);
        d.dispatch(&a, &snapshot());
        // different category, same paths: new alert, no duplicate records
        let b = assessment(0.9, ThreatCategory::AiDetected);
        d.dispatch(&b, &snapshot());
        let records = d.malicious_files();
        assert_eq!(records.len(), 2);
        let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/d/a.txt", "/d/b.txt"]);
    }

    #[test]
    fn suppressed_duplicates_still_register_new_paths() {
        let d = dispatcher();
        let a = assessment(0.9, ThreatCategory::FileEncryption);
        d.dispatch(&a, &snapshot());

        let mut wider = snapshot();
        wider.affected_paths.push("/d/c.txt".into());
        let out = d.dispatch(&a, &wider);
        assert!(out.suppressed);
        assert_eq!(d.malicious_files().len(), 3);
    }

    #[test]
    fn blocked_processes_are_annotated() {
        let d = dispatcher();
        d.dispatch(&assessment(0.9, ThreatCategory::FileEncryption), &snapshot());
        d.annotate_blocked(4321);
        d.annotate_blocked(4321); // no double annotation
        let alerts = d.alerts();
        assert!(alerts[0].suspicious_processes[0].reason.ends_with("[BLOCKED]"));
        assert_eq!(alerts[0].suspicious_processes[0].reason.matches("[BLOCKED]").count(), 1);
    }
}
