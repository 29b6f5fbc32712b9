//! Runs dispatched actions off the ingestion lane: bounded concurrency,
//! hard per-kind timeouts, one retry, and failures surfaced as system
//! alerts plus grammar log lines rather than dropped.

use super::{ActionError, BackupExecutor, BlockMethod, ProcessBlocker};
use crate::config::ActionsConfig;
use crate::dispatch::{ActionRequest, Dispatcher};
use crate::logging::DetectorLog;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct ActionRunner {
    blocker: Arc<dyn ProcessBlocker>,
    backup: Arc<dyn BackupExecutor>,
    dispatcher: Arc<Dispatcher>,
    log: Arc<DetectorLog>,
    permits: Arc<Semaphore>,
    config: ActionsConfig,
}

impl ActionRunner {
    pub fn new(
        blocker: Arc<dyn ProcessBlocker>,
        backup: Arc<dyn BackupExecutor>,
        dispatcher: Arc<Dispatcher>,
        log: Arc<DetectorLog>,
        config: ActionsConfig,
    ) -> Self {
        Self {
            blocker,
            backup,
            dispatcher,
            log,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
        }
    }

    /// Hand one request to the executor pool. Never blocks the caller.
    pub fn submit(&self, request: ActionRequest) -> JoinHandle<()> {
        let blocker = self.blocker.clone();
        let backup = self.backup.clone();
        let dispatcher = self.dispatcher.clone();
        let log = self.log.clone();
        let permits = self.permits.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(_) => return, // pool shut down
            };
            match request {
                ActionRequest::BlockProcess { pid, name, reason } => {
                    run_block(blocker, dispatcher, log, &config, pid, name, reason).await;
                }
                ActionRequest::Backup => {
                    run_backup(backup, dispatcher, log, &config).await;
                }
            }
        })
    }

    /// Cooperative abort of any in-flight backup; process blocks are left
    /// to finish, aborting those mid-flight is unsafe.
    pub fn abort_backups(&self) {
        self.backup.cancel();
    }

    pub fn blocker(&self) -> Arc<dyn ProcessBlocker> {
        self.blocker.clone()
    }
}

async fn run_block(
    blocker: Arc<dyn ProcessBlocker>,
    dispatcher: Arc<Dispatcher>,
    log: Arc<DetectorLog>,
    config: &ActionsConfig,
    pid: u32,
    name: String,
    reason: String,
) {
    let timeout = Duration::from_secs(config.process_timeout_secs);
    let mut last_failure = String::new();

    for attempt in 0..2u8 {
        let b = blocker.clone();
        let (n, r) = (name.clone(), reason.clone());
        let result =
            tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || b.block(pid, &n, &r)))
                .await;
        match result {
            Ok(Ok(Ok(outcome))) => {
                match outcome.method {
                    BlockMethod::Terminated | BlockMethod::Simulated => {
                        log.process_blocked(pid, &name)
                    }
                    BlockMethod::Killed => log.process_killed(pid, &name),
                    BlockMethod::AlreadyBlocked => {
                        info!(pid, "block request for already-blocked process")
                    }
                }
                dispatcher.annotate_blocked(pid);
                return;
            }
            Ok(Ok(Err(e))) => {
                last_failure = e.to_string();
                warn!(pid, attempt, error = %last_failure, "process block failed");
            }
            Ok(Err(join_err)) => {
                last_failure = join_err.to_string();
                warn!(pid, attempt, error = %last_failure, "process block panicked");
            }
            Err(_) => {
                last_failure = format!("timed out after {}s", config.process_timeout_secs);
                warn!(pid, attempt, "process block timed out");
            }
        }
    }

    log.log(
        crate::logging::LogLevel::Error,
        &format!("Error blocking process {pid}: {last_failure}"),
    );
    let message = format!("Process block failed for PID={pid} Name={name}: {last_failure}");
    log.warning_alert(&message);
    dispatcher.system_alert(message);
}

async fn run_backup(
    backup: Arc<dyn BackupExecutor>,
    dispatcher: Arc<Dispatcher>,
    log: Arc<DetectorLog>,
    config: &ActionsConfig,
) {
    let timeout = Duration::from_secs(config.backup_timeout_secs);
    let mut last_failure = String::new();

    for attempt in 0..2u8 {
        let b = backup.clone();
        let result = tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || b.run())).await;
        match result {
            Ok(Ok(Ok(outcome))) => {
                info!(
                    files = outcome.copied_files,
                    skipped = outcome.skipped,
                    target = %outcome.target.display(),
                    "backup complete"
                );
                return;
            }
            // another run already covers this request
            Ok(Ok(Err(ActionError::BackupInProgress))) => {
                info!("backup skipped, already running");
                return;
            }
            Ok(Ok(Err(ActionError::Cancelled))) => {
                info!("backup cancelled");
                return;
            }
            Ok(Ok(Err(e))) => {
                last_failure = e.to_string();
                warn!(attempt, error = %last_failure, "backup failed");
            }
            Ok(Err(join_err)) => {
                last_failure = join_err.to_string();
                warn!(attempt, error = %last_failure, "backup panicked");
            }
            Err(_) => {
                backup.cancel(); // the blocking walk checks this flag
                last_failure = format!("timed out after {}s", config.backup_timeout_secs);
                warn!(attempt, "backup timed out");
            }
        }
    }

    let message = format!("Backup failed: {last_failure}");
    log.warning_alert(&message);
    dispatcher.system_alert(message);
}
