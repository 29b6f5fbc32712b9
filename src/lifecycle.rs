//! Detector lifecycle: Offline -> Starting -> Online (with an optional
//! Learning warm-up when inference scoring is configured), back to Offline
//! on stop, crash, or failed start. The controller is the sole owner of the
//! run-state handle; start and stop are both idempotent.

use crate::actions::{
    ActionRunner, BackupExecutor, BackupManager, ProcessBlocker, SimulatedProcessBlocker,
    SystemProcessBlocker,
};
use crate::config::{DetectorConfig, ScoringStrategyKind};
use crate::dispatch::{ActionRequest, Dispatcher};
use crate::logging::DetectorLog;
use crate::pipeline::{DetectorWorker, INGEST_QUEUE_DEPTH};
use crate::scoring::build_strategy;
use crate::sources::{EventAdapter, FsWatchSource, RawFileEvent};
use crate::storage::AlertStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorStatus {
    Offline,
    Starting,
    Online,
    Learning,
}

impl DetectorStatus {
    pub fn is_running(&self) -> bool {
        !matches!(self, DetectorStatus::Offline)
    }
}

/// Process-wide run-state singleton.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorHandle {
    pub status: DetectorStatus,
    pub handle_id: Option<Uuid>,
    pub pid: Option<u32>,
}

impl DetectorHandle {
    fn offline() -> Self {
        Self {
            status: DetectorStatus::Offline,
            handle_id: None,
            pid: None,
        }
    }
}

#[derive(Debug)]
pub enum StartOutcome {
    Started(DetectorHandle),
    AlreadyRunning(DetectorHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
    NotRunning,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("monitored directory {path} unavailable: {source}")]
    MonitoredDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("file-system watch failed to start: {0}")]
    WatchInit(String),
}

struct RunState {
    sender: Option<tokio::sync::mpsc::Sender<RawFileEvent>>,
    watch: Option<FsWatchSource>,
    worker: Option<tokio::task::JoinHandle<()>>,
}

pub struct DetectorController {
    config: DetectorConfig,
    handle: Arc<Mutex<DetectorHandle>>,
    run: Mutex<RunState>,
    dispatcher: Arc<Dispatcher>,
    runner: Arc<ActionRunner>,
    backup: Arc<dyn BackupExecutor>,
    log: Arc<DetectorLog>,
    ran_before: std::sync::atomic::AtomicBool,
}

impl DetectorController {
    /// Wire the full pipeline from configuration. The store is best-effort:
    /// a failure to open it degrades persistence, not detection.
    pub fn from_config(config: DetectorConfig, log: Arc<DetectorLog>) -> Arc<Self> {
        let store = match std::fs::create_dir_all(&config.data_dir) {
            Ok(()) => {
                let store_path = config.data_dir.join("alerts.db");
                // In production the secret comes from Secure Enclave / Keystore
                match AlertStore::open(&store_path, b"device-secret-placeholder") {
                    Ok(s) => Some(Arc::new(s)),
                    Err(e) => {
                        warn!(error = %e, "alert store unavailable, persistence disabled");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "data dir unavailable, persistence disabled");
                None
            }
        };

        let dispatcher = Arc::new(Dispatcher::new(config.dispatch.clone(), store));
        let log_files = vec![config.log.detector_log.clone(), config.log.simulation_log.clone()];
        let backup: Arc<dyn BackupExecutor> = Arc::new(BackupManager::new(
            config.monitored_dir.clone(),
            config.backup_root(),
            log_files,
            Some(log.clone()),
        ));
        let blocker: Arc<dyn ProcessBlocker> = if config.actions.simulate_process_actions {
            Arc::new(SimulatedProcessBlocker::new())
        } else {
            Arc::new(SystemProcessBlocker::new())
        };
        let runner = Arc::new(ActionRunner::new(
            blocker,
            backup.clone(),
            dispatcher.clone(),
            log.clone(),
            config.actions.clone(),
        ));

        Arc::new(Self {
            config,
            handle: Arc::new(Mutex::new(DetectorHandle::offline())),
            run: Mutex::new(RunState {
                sender: None,
                watch: None,
                worker: None,
            }),
            dispatcher,
            runner,
            backup,
            log,
            ran_before: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Idempotent: an already-running detector returns its current handle
    /// instead of spawning a second worker. A failed start always settles
    /// back to Offline.
    pub fn start(&self) -> Result<StartOutcome, LifecycleError> {
        {
            let mut handle = self.handle.lock().expect("handle lock");
            if handle.status.is_running() {
                return Ok(StartOutcome::AlreadyRunning(handle.clone()));
            }
            handle.status = DetectorStatus::Starting;
            handle.handle_id = Some(Uuid::new_v4());
            handle.pid = Some(std::process::id());
        }

        match self.spawn_pipeline() {
            Ok(()) => {
                self.ran_before
                    .store(true, std::sync::atomic::Ordering::Relaxed);
                let handle = self.handle.lock().expect("handle lock").clone();
                info!(pid = ?handle.pid, status = ?handle.status, "detector started");
                Ok(StartOutcome::Started(handle))
            }
            Err(e) => {
                error!(error = %e, "detector start failed");
                *self.handle.lock().expect("handle lock") = DetectorHandle::offline();
                Err(e)
            }
        }
    }

    fn spawn_pipeline(&self) -> Result<(), LifecycleError> {
        std::fs::create_dir_all(&self.config.monitored_dir).map_err(|e| {
            LifecycleError::MonitoredDir {
                path: self.config.monitored_dir.clone(),
                source: e,
            }
        })?;

        let (tx, rx) = tokio::sync::mpsc::channel::<RawFileEvent>(INGEST_QUEUE_DEPTH);
        let watch = FsWatchSource::start(
            &self.config.monitored_dir,
            self.config.features.clone(),
            tx.clone(),
        )
        .map_err(|e| LifecycleError::WatchInit(e.to_string()))?;

        let adapter = EventAdapter::new(
            self.config.backup_root(),
            vec![
                self.config.log.detector_log.clone(),
                self.config.log.simulation_log.clone(),
            ],
        );
        let strategy = build_strategy(&self.config.scoring, &self.config.rules);
        info!(strategy = strategy.name(), "scoring strategy selected");
        let (warmed_tx, warmed_rx) = tokio::sync::oneshot::channel();
        let worker = DetectorWorker::new(
            &self.config,
            adapter,
            strategy,
            self.dispatcher.clone(),
            self.runner.clone(),
            self.backup.clone(),
            self.log.clone(),
            warmed_tx,
        );

        let handle_ref = self.handle.clone();
        let worker_task = tokio::spawn(async move {
            worker.run(rx).await;
            // queue closed: either an orderly stop (controller resets the
            // handle next) or the sources died; settle Offline either way
            let mut handle = handle_ref.lock().expect("handle lock");
            if handle.status.is_running() {
                handle.status = DetectorStatus::Offline;
            }
        });

        // inference warm-up: Learning until the first scoring round lands
        if self.config.scoring.strategy == ScoringStrategyKind::Inference {
            self.handle.lock().expect("handle lock").status = DetectorStatus::Learning;
            let handle_ref = self.handle.clone();
            tokio::spawn(async move {
                if warmed_rx.await.is_ok() {
                    let mut handle = handle_ref.lock().expect("handle lock");
                    if handle.status == DetectorStatus::Learning {
                        handle.status = DetectorStatus::Online;
                    }
                }
            });
        } else {
            drop(warmed_rx);
            self.handle.lock().expect("handle lock").status = DetectorStatus::Online;
        }

        let mut run = self.run.lock().expect("run lock");
        run.sender = Some(tx);
        run.watch = Some(watch);
        run.worker = Some(worker_task);
        drop(run);

        // initial backup right after start
        self.runner.submit(ActionRequest::Backup);
        Ok(())
    }

    /// Idempotent. Drains queued ingestion (the worker finishes what was
    /// already accepted), aborts in-flight backups, and lets process blocks
    /// run to completion.
    pub async fn stop(&self) -> StopOutcome {
        {
            let handle = self.handle.lock().expect("handle lock");
            if !handle.status.is_running() {
                return if self.ran_before.load(std::sync::atomic::Ordering::Relaxed) {
                    StopOutcome::AlreadyStopped
                } else {
                    StopOutcome::NotRunning
                };
            }
        }

        let worker = {
            let mut run = self.run.lock().expect("run lock");
            if let Some(watch) = run.watch.take() {
                watch.stop();
            }
            run.sender = None; // closes the queue; worker drains and exits
            run.worker.take()
        };

        self.runner.abort_backups();

        if let Some(worker) = worker {
            if tokio::time::timeout(Duration::from_secs(10), worker)
                .await
                .is_err()
            {
                warn!("worker did not drain within 10s, detaching");
            }
        }

        *self.handle.lock().expect("handle lock") = DetectorHandle::offline();
        info!("detector stopped");
        StopOutcome::Stopped
    }

    /// Pure read of the current handle.
    pub fn status(&self) -> DetectorHandle {
        self.handle.lock().expect("handle lock").clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn runner(&self) -> Arc<ActionRunner> {
        self.runner.clone()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}
