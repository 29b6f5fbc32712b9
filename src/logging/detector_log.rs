//! Plain-text log file in the grammar the dashboard parser depends on:
//! `YYYY-MM-DD HH:MM:SS,mmm - LEVEL - message`, with bracketed tags for
//! alerts, AI predictions, blocks, and backups. Every line is mirrored to
//! tracing and to a broadcast channel carrying the typed form, so new
//! consumers get structure while the text contract stays intact.

use chrono::Local;
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::broadcast;

const RING_CAPACITY: usize = 1000;
const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

/// Typed form of one emitted line.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
    pub formatted: String,
}

pub struct DetectorLog {
    path: PathBuf,
    ring: Mutex<VecDeque<String>>,
    tx: broadcast::Sender<LogLine>,
}

impl DetectorLog {
    pub fn new(path: PathBuf) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            path,
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscribe to the typed line stream.
    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.tx.subscribe()
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let now = Local::now();
        let formatted = format!(
            "{},{:03} - {} - {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            now.timestamp_subsec_millis(),
            level.as_str(),
            message
        );

        match level {
            LogLevel::Debug => tracing::debug!(target: "detector_log", "{message}"),
            LogLevel::Info => tracing::info!(target: "detector_log", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "detector_log", "{message}"),
            LogLevel::Error | LogLevel::Critical => {
                tracing::error!(target: "detector_log", "{message}")
            }
        }

        if let Err(e) = self.append(&formatted) {
            tracing::warn!(path = %self.path.display(), error = %e, "log file append failed");
        }

        let mut ring = self.ring.lock().expect("log ring lock");
        if ring.len() >= RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(formatted.clone());
        drop(ring);

        let _ = self.tx.send(LogLine {
            level,
            message: message.to_string(),
            formatted,
        });
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{line}")
    }

    /// Recent lines held in memory (newest last).
    pub fn recent(&self, n: usize) -> Vec<String> {
        let ring = self.ring.lock().expect("log ring lock");
        ring.iter().rev().take(n).rev().cloned().collect()
    }

    // --- grammar helpers; these strings are the wire contract ---

    pub fn file_created(&self, path: &str) {
        self.log(LogLevel::Info, &format!("File created: {path}"));
    }

    pub fn file_modified(&self, path: &str) {
        self.log(LogLevel::Info, &format!("File modified: {path}"));
    }

    pub fn file_deleted(&self, path: &str) {
        self.log(LogLevel::Info, &format!("File deleted: {path}"));
    }

    pub fn file_moved(&self, src: &str, dest: &str) {
        self.log(LogLevel::Info, &format!("File moved: {src} -> {dest}"));
    }

    pub fn critical_alert(&self, reason: &str) {
        self.log(
            LogLevel::Critical,
            &format!("[CRITICAL ALERT] Reason: {reason}"),
        );
    }

    pub fn warning_alert(&self, reason: &str) {
        self.log(LogLevel::Warning, &format!("[Warning] Reason: {reason}"));
    }

    pub fn ai_detect(&self, probability: f64, file: &str, malicious: bool, detector_pid: u32) {
        let prediction = if malicious { "Malicious" } else { "Benign" };
        self.log(
            LogLevel::Info,
            &format!(
                "[AI_DETECT Probability={probability:.4} File={file} Prediction={prediction} DetectorPID={detector_pid}]"
            ),
        );
    }

    pub fn process_blocked(&self, pid: u32, name: &str) {
        self.log(
            LogLevel::Info,
            &format!("[PROCESS_BLOCKED] PID={pid} Name={name} Action=Terminated"),
        );
    }

    pub fn process_killed(&self, pid: u32, name: &str) {
        self.log(
            LogLevel::Info,
            &format!("[PROCESS_KILLED] PID={pid} Name={name} Action=Killed"),
        );
    }

    pub fn backup_start(&self, target: &str) {
        self.log(LogLevel::Info, &format!("[BACKUP_START] Target={target}"));
    }

    pub fn backup_end(
        &self,
        duration_secs: f64,
        copied_files: u64,
        copied_dirs: u64,
        skipped: u64,
        target: &str,
    ) {
        self.log(
            LogLevel::Info,
            &format!(
                "[BACKUP_END] Duration={duration_secs:.2}s CopiedFiles={copied_files} CopiedDirs={copied_dirs} Skipped={skipped} Target={target}"
            ),
        );
    }
}

/// Last `n` lines of a log file, newline-joined as the log endpoints return
/// them. `None` when the file does not exist.
pub fn read_last_log_lines(path: &Path, n: usize) -> std::io::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    let mut out = lines[start..].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    Ok(Some(out))
}
