//! Route handlers. Response bodies match the dashboard's existing client
//! field-for-field; additions are strictly additive.

use super::{ApiError, ApiResult, AppState};
use crate::actions::{ActionError, BlockMethod};
use crate::lifecycle::{DetectorStatus, StartOutcome, StopOutcome};
use crate::logging::read_last_log_lines;
use crate::sources::{DirectoryScanner, ScanIssue};
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
    /// Real engine state; the plain `status` field stays binary for the
    /// legacy client
    engine_state: DetectorStatus,
}

pub async fn detector_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let handle = state.controller.status();
    Json(StatusResponse {
        status: if handle.status.is_running() {
            "running"
        } else {
            "stopped"
        },
        pid: handle.pid,
        engine_state: handle.status,
    })
}

pub async fn detector_start(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    match state.controller.start()? {
        StartOutcome::Started(h) => Ok(Json(json!({
            "status": "started",
            "pid": h.pid,
        }))),
        StartOutcome::AlreadyRunning(h) => Ok(Json(json!({
            "status": "already_running",
            "pid": h.pid,
        }))),
    }
}

pub async fn detector_stop(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.controller.stop().await {
        StopOutcome::Stopped => (StatusCode::OK, Json(json!({"status": "stopped"}))),
        StopOutcome::AlreadyStopped => {
            (StatusCode::OK, Json(json!({"status": "already_stopped"})))
        }
        StopOutcome::NotRunning => (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "not_running"})),
        ),
    }
}

pub async fn scan(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let config = state.controller.config();
    let monitored = config.monitored_dir.clone();
    if !monitored.is_dir() {
        return Err(ApiError::BadRequest(format!(
            "Monitored directory '{}' not found.",
            monitored.display()
        )));
    }
    let scanner = DirectoryScanner::new(
        monitored.clone(),
        config.backup_root(),
        vec![
            config.log.detector_log.clone(),
            config.log.simulation_log.clone(),
        ],
    );
    let report = tokio::task::spawn_blocking(move || scanner.scan())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("Error during scan: {e}")))?;

    let issues: Vec<ScanIssue> = report.potential_issues;
    info!(files = report.files_scanned_count, issues = issues.len(), "scan complete");
    Ok(Json(json!({
        "status": "scan_complete",
        "message": format!("Scan of {} finished.", monitored.display()),
        "files_scanned_count": report.files_scanned_count,
        "files_list": report.files_list,
        "potential_issues": issues,
    })))
}

pub async fn simulate(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let config = state.controller.config();
    let monitored = config.monitored_dir.clone();
    if !monitored.exists() {
        return Err(ApiError::BadRequest(format!(
            "Monitored directory '{}' not found. Cannot simulate.",
            monitored.display()
        )));
    }

    let log = state.simulation_log.clone();
    let _run = tokio::task::spawn_blocking(move || {
        if let Err(e) = crate::simulate::run_simulation(&monitored, &log) {
            warn!(error = %e, "simulation run failed");
        }
    });

    Ok(Json(json!({
        "status": "simulation_started",
        "message": "Ransomware simulation executed (check logs).",
    })))
}

async fn tail_log(path: std::path::PathBuf, lines: usize) -> (StatusCode, Json<serde_json::Value>) {
    match read_last_log_lines(&path, lines) {
        Ok(Some(logs)) => (
            StatusCode::OK,
            Json(json!({"status": "success", "logs": logs})),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "status": "error",
                "logs": format!("Log file not found at {}.", path.display()),
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "logs": format!("Error reading log file: {e}"),
            })),
        ),
    }
}

pub async fn detector_logs(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let config = state.controller.config();
    tail_log(config.log.detector_log.clone(), config.api.log_tail_lines).await
}

pub async fn simulation_logs(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let config = state.controller.config();
    tail_log(config.log.simulation_log.clone(), config.api.log_tail_lines).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRequest {
    pub process_id: Option<u32>,
    pub process_name: Option<String>,
    pub reason: Option<String>,
    #[serde(default)]
    pub threat_level: Option<String>,
    #[serde(default)]
    pub auto_blocked: Option<bool>,
}

pub async fn block(
    State(state): State<AppState>,
    Json(req): Json<BlockRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let (Some(pid), Some(name), Some(reason)) = (req.process_id, req.process_name, req.reason)
    else {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    };

    info!(
        pid,
        name,
        threat_level = req.threat_level.as_deref().unwrap_or("unspecified"),
        auto = req.auto_blocked.unwrap_or(false),
        "manual block requested"
    );

    let blocker = state.controller.runner().blocker();
    let (n, r) = (name.clone(), reason.clone());
    let outcome = tokio::task::spawn_blocking(move || blocker.block(pid, &n, &r))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| match e {
            ActionError::ProcessNotFound(p) => ApiError::NotFound(format!("Process {p} not found")),
            other => ApiError::Internal(other.to_string()),
        })?;

    state.controller.dispatcher().annotate_blocked(pid);
    if outcome.method != BlockMethod::AlreadyBlocked {
        state.detector_log.process_blocked(pid, &name);
    }

    Ok(Json(json!({
        "status": "success",
        "timestamp": Utc::now().timestamp_millis(),
        "message": format!("Process {name} (PID: {pid}) has been blocked"),
        "actionTaken": "process_terminated",
        "additionalActions": ["network_isolation_enabled", "system_snapshot_created"],
    })))
}
