//! Integration tests: config defaults, the full event → alert pipeline,
//! executor contracts, and the persisted store.

use chrono::Utc;
use ransomguard_agent::actions::{
    ActionRunner, BackupExecutor, BackupManager, ProcessBlocker, SimulatedProcessBlocker,
};
use ransomguard_agent::config::DetectorConfig;
use ransomguard_agent::dispatch::{AlertSeverity, AlertStatus, Dispatcher};
use ransomguard_agent::pipeline::DetectorWorker;
use ransomguard_agent::scoring::{ActionKind, RuleBasedScorer, ScoringStrategy};
use ransomguard_agent::sources::{EventAdapter, EventMetadata, ProcessInfo, RawFileEvent};
use ransomguard_agent::storage::AlertStore;
use ransomguard_agent::{DetectorLog, FeatureExtractor, FileOperation};
use std::sync::Arc;

#[test]
fn config_defaults_match_documented_thresholds() {
    let c = DetectorConfig::load(std::path::Path::new("nonexistent.json"));
    assert_eq!(c.features.window_secs, 300);
    assert_eq!(c.features.high_entropy_threshold, 0.8);
    assert_eq!(c.rules.write_burst_count, 50);
    assert_eq!(c.rules.write_burst_window_secs, 60);
    assert_eq!(c.rules.extension_change_count, 10);
    assert_eq!(c.rules.high_entropy_count, 5);
    assert_eq!(c.dispatch.auto_block_confidence, 0.85);
    assert_eq!(c.dispatch.alert_floor, 0.3);
    assert_eq!(c.dispatch.dedup_window_secs, 300);
    assert_eq!(c.scoring.inference_timeout_secs, 5);
    assert_eq!(c.actions.process_timeout_secs, 10);
    assert_eq!(c.actions.backup_timeout_secs, 60);
}

#[test]
fn write_burst_scores_as_a_threat_end_to_end() {
    let config = DetectorConfig::default();
    let extractor = FeatureExtractor::new(config.features.clone());
    let scorer = RuleBasedScorer::new(config.rules.clone());

    let now = Utc::now();
    for i in 0..51 {
        let ts = now + chrono::Duration::milliseconds(i * 1157); // ~59s span
        let event = ransomguard_agent::FileActivityEvent::new(
            format!("/docs/report_{i}.txt"),
            FileOperation::Modify,
            ts,
            ProcessInfo {
                name: "updater".into(),
                pid: 808,
                executable_path: None,
            },
            None,
        );
        extractor.observe(&event);
    }
    let snapshot = extractor.snapshot_at("updater:808", now + chrono::Duration::seconds(59));
    assert_eq!(snapshot.modify_count, 51);

    let assessment = scorer.score(&snapshot);
    assert!(assessment.threat_detected);
    assert!(assessment.confidence >= 0.3);
}

/// Full scenario: 60 high-entropy writes in 10 seconds from `ransom.exe`
/// must end in a single critical Active alert recommending termination and
/// isolation, with a registry record for each touched path.
#[tokio::test]
async fn encryption_burst_produces_a_critical_alert_and_registry_records() {
    let dir = tempfile::tempdir().unwrap();
    let monitored = dir.path().join("docs");
    std::fs::create_dir_all(&monitored).unwrap();

    let mut config = DetectorConfig::default();
    config.monitored_dir = monitored.clone();

    let log = Arc::new(DetectorLog::new(dir.path().join("detector.log")));
    let dispatcher = Arc::new(Dispatcher::new(config.dispatch.clone(), None));
    let blocker: Arc<dyn ProcessBlocker> = Arc::new(SimulatedProcessBlocker::new());
    let backup: Arc<dyn BackupExecutor> = Arc::new(BackupManager::new(
        monitored.clone(),
        config.backup_root(),
        vec![],
        None,
    ));
    let runner = Arc::new(ActionRunner::new(
        blocker.clone(),
        backup.clone(),
        dispatcher.clone(),
        log.clone(),
        config.actions.clone(),
    ));
    let adapter = EventAdapter::new(config.backup_root(), vec![]);
    let strategy: Arc<dyn ScoringStrategy> =
        Arc::new(RuleBasedScorer::new(config.rules.clone()));
    let (warmed_tx, _warmed_rx) = tokio::sync::oneshot::channel();
    let worker = DetectorWorker::new(
        &config,
        adapter,
        strategy,
        dispatcher.clone(),
        runner.clone(),
        backup,
        log.clone(),
        warmed_tx,
    );

    let (tx, rx) = tokio::sync::mpsc::channel(1024);
    let worker_task = tokio::spawn(worker.run(rx));

    let base = Utc::now();
    for i in 0..60i64 {
        let raw = RawFileEvent {
            path: monitored.join(format!("victim_{i}.doc")).display().to_string(),
            operation: Some("modify".into()),
            timestamp: Some(base + chrono::Duration::milliseconds(i * 166)),
            process: Some(ProcessInfo {
                name: "ransom.exe".into(),
                pid: 4321,
                executable_path: Some("/tmp/ransom.exe".into()),
            }),
            metadata: Some(EventMetadata {
                entropy: Some(0.97),
                file_size: Some(8192),
                ..Default::default()
            }),
        };
        tx.send(raw).await.unwrap();
    }
    drop(tx);
    worker_task.await.unwrap();

    let alerts = dispatcher.alerts();
    assert_eq!(alerts.len(), 1, "one deduplicated alert expected");
    let alert = &alerts[0];
    assert_eq!(alert.severity, AlertSeverity::Critical);
    assert_eq!(alert.status, AlertStatus::Active);
    assert!(alert.recommended_actions.contains(&ActionKind::TerminateProcess));
    assert!(alert.recommended_actions.contains(&ActionKind::IsolateNetwork));

    let records = dispatcher.malicious_files();
    assert_eq!(records.len(), 60, "one registry record per affected path");

    // the log carries the alert in the parser grammar
    let lines = log.recent(1000).join("\n");
    assert!(lines.contains("[CRITICAL ALERT] Reason:"));
    assert!(lines.contains("File modified:"));

    // the auto-block went through the simulated executor exactly once
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let history = blocker.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].pid, 4321);
}

#[tokio::test]
async fn lifecycle_start_and_stop_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DetectorConfig::default();
    config.monitored_dir = dir.path().join("docs");
    config.data_dir = dir.path().join("data");
    config.actions.simulate_process_actions = true;
    config.log.detector_log = dir.path().join("detector.log");
    config.log.simulation_log = dir.path().join("simulation.log");

    let log = Arc::new(DetectorLog::new(config.log.detector_log.clone()));
    let controller = ransomguard_agent::DetectorController::from_config(config, log);

    // stop before any start: nothing to do
    assert_eq!(
        controller.stop().await,
        ransomguard_agent::lifecycle::StopOutcome::NotRunning
    );
    assert_eq!(
        controller.status().status,
        ransomguard_agent::DetectorStatus::Offline
    );

    let first = controller.start().expect("start");
    assert!(matches!(
        first,
        ransomguard_agent::lifecycle::StartOutcome::Started(_)
    ));
    assert!(controller.status().status.is_running());
    assert!(controller.status().pid.is_some());

    // second start returns the live handle, no duplicate worker
    let second = controller.start().expect("start again");
    assert!(matches!(
        second,
        ransomguard_agent::lifecycle::StartOutcome::AlreadyRunning(_)
    ));

    assert_eq!(
        controller.stop().await,
        ransomguard_agent::lifecycle::StopOutcome::Stopped
    );
    assert_eq!(
        controller.status().status,
        ransomguard_agent::DetectorStatus::Offline
    );
    assert_eq!(
        controller.stop().await,
        ransomguard_agent::lifecycle::StopOutcome::AlreadyStopped
    );
}

#[test]
fn block_process_is_idempotent_with_one_action_record() {
    let blocker = SimulatedProcessBlocker::new();
    assert!(blocker.block(1234, "ransom.exe", "burst").is_ok());
    assert!(blocker.block(1234, "ransom.exe", "burst").is_ok());
    assert_eq!(blocker.history().len(), 1);
}

#[test]
fn alert_store_roundtrip_and_registry_dedup() {
    let dir = tempfile::tempdir().unwrap();
    let store = AlertStore::open(&dir.path().join("alerts.db"), b"test-secret").unwrap();

    let alert = ransomguard_agent::Alert {
        id: "a-1".into(),
        kind: "File encryption activity".into(),
        message: "Ransomware behavior: File encryption activity".into(),
        timestamp: Utc::now(),
        severity: AlertSeverity::Critical,
        status: AlertStatus::Active,
        details: "File encryption activity detected for process ransom.exe (PID 4321)".into(),
        evidence: vec!["Multiple high-entropy write operations detected".into()],
        affected_files: ["/d/a.txt".to_string()].into_iter().collect(),
        suspicious_processes: vec![],
        recommended_actions: Default::default(),
    };
    store.upsert_alert(&alert).unwrap();
    let loaded = store.get_alert("a-1").unwrap().unwrap();
    assert_eq!(loaded.details, alert.details);
    assert_eq!(loaded.severity, AlertSeverity::Critical);

    let record = ransomguard_agent::MaliciousFileRecord {
        path: "/d/a.txt".into(),
        timestamp: Utc::now(),
        reason: "entropy".into(),
    };
    store.insert_malicious_file(&record).unwrap();
    store.insert_malicious_file(&record).unwrap();
    assert_eq!(store.malicious_file_count().unwrap(), 1);

    // retention sweep removes old alerts
    let pruned = store
        .prune_before(Utc::now().timestamp_millis() + 1_000)
        .unwrap();
    assert_eq!(pruned, 1);
    assert!(store.get_alert("a-1").unwrap().is_none());
}
