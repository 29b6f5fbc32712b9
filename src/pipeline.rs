//! The streaming lane: one worker consumes the ordered ingestion queue and
//! runs adapter -> extractor -> scoring -> dispatcher per event. Actions
//! leave the lane through the runner; nothing here blocks on them.

use crate::actions::{ActionRunner, BackupExecutor};
use crate::config::{DetectorConfig, ScoringStrategyKind};
use crate::dispatch::{ActionRequest, AlertSeverity, Dispatcher};
use crate::features::FeatureExtractor;
use crate::logging::DetectorLog;
use crate::scoring::{ScoringStrategy, ThreatAssessment};
use crate::sources::{EventAdapter, FileActivityEvent, FileOperation, MalformedEventError, RawFileEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Bounded ingestion queue; sources block (briefly) rather than the worker
/// dropping events.
pub const INGEST_QUEUE_DEPTH: usize = 1024;

pub struct DetectorWorker {
    adapter: EventAdapter,
    extractor: FeatureExtractor,
    strategy: Arc<dyn ScoringStrategy>,
    strategy_kind: ScoringStrategyKind,
    dispatcher: Arc<Dispatcher>,
    runner: Arc<ActionRunner>,
    backup: Arc<dyn BackupExecutor>,
    log: Arc<DetectorLog>,
    backup_interval: Duration,
    /// Fired once after the first completed scoring round (warm-up done)
    warmed: Option<oneshot::Sender<()>>,
}

impl DetectorWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &DetectorConfig,
        adapter: EventAdapter,
        strategy: Arc<dyn ScoringStrategy>,
        dispatcher: Arc<Dispatcher>,
        runner: Arc<ActionRunner>,
        backup: Arc<dyn BackupExecutor>,
        log: Arc<DetectorLog>,
        warmed: oneshot::Sender<()>,
    ) -> Self {
        Self {
            adapter,
            extractor: FeatureExtractor::new(config.features.clone()),
            strategy,
            strategy_kind: config.scoring.strategy,
            dispatcher,
            runner,
            backup,
            log,
            backup_interval: Duration::from_secs(config.actions.backup_interval_secs),
            warmed: Some(warmed),
        }
    }

    /// Consume the queue until every sender is gone, then return. Stopping
    /// the detector closes the sending side, so shutdown drains what was
    /// already queued.
    pub async fn run(mut self, mut rx: mpsc::Receiver<RawFileEvent>) {
        while let Some(raw) = rx.recv().await {
            match self.adapter.ingest(raw) {
                Ok(event) => self.process(event).await,
                // routine self-filtering, not noise worth a warning
                Err(e @ MalformedEventError::BackupPath(_))
                | Err(e @ MalformedEventError::LogFile(_)) => {
                    debug!(error = %e, "event filtered");
                }
                Err(e) => {
                    warn!(error = %e, "malformed event dropped");
                }
            }

            if self.backup.due(self.backup_interval) {
                self.runner.submit(ActionRequest::Backup);
            }
        }
        debug!("ingestion queue closed, worker draining done");
    }

    async fn process(&mut self, event: FileActivityEvent) {
        self.emit_activity_line(&event);
        self.extractor.observe(&event);
        let snapshot = self.extractor.snapshot(&event.process_identity());

        let strategy = self.strategy.clone();
        let snap = snapshot.clone();
        let assessment = match tokio::task::spawn_blocking(move || strategy.score(&snap)).await {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "scoring task failed, treating event as benign");
                ThreatAssessment::benign()
            }
        };

        if let Some(tx) = self.warmed.take() {
            let _ = tx.send(());
        }

        if self.strategy_kind == ScoringStrategyKind::Inference {
            self.log.ai_detect(
                assessment.confidence,
                &event.path,
                assessment.threat_detected,
                std::process::id(),
            );
        }

        let outcome = self.dispatcher.dispatch(&assessment, &snapshot);
        if let Some(alert) = &outcome.alert {
            let reason = format!(
                "{} File={} DetectorPID={}",
                alert.evidence.first().unwrap_or(&alert.details),
                event.path,
                std::process::id()
            );
            match alert.severity {
                AlertSeverity::Critical => self.log.critical_alert(&reason),
                _ => self.log.warning_alert(&reason),
            }
        }
        for action in outcome.actions {
            self.runner.submit(action);
        }
    }

    /// Plain activity lines in the parser grammar. Permission changes have
    /// no legacy line form and go to tracing only.
    fn emit_activity_line(&self, event: &FileActivityEvent) {
        match event.operation {
            FileOperation::Create => self.log.file_created(&event.path),
            FileOperation::Modify => self.log.file_modified(&event.path),
            FileOperation::Delete => self.log.file_deleted(&event.path),
            FileOperation::Rename => {
                let old = event
                    .metadata
                    .as_ref()
                    .and_then(|m| m.old_path.clone())
                    .unwrap_or_else(|| event.path.clone());
                self.log.file_moved(&old, &event.path);
            }
            FileOperation::PermissionChange => {
                debug!(path = %event.path, "permission change observed");
            }
        }
    }
}
