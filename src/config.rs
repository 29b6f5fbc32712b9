//! Detector configuration. Thresholds default to the shipped calibration but
//! are deployment-tunable, never hard constants.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Data directory (alert store, backups)
    pub data_dir: PathBuf,
    /// Directory tree watched for file activity
    pub monitored_dir: PathBuf,
    /// Backup root; defaults to a sibling of the monitored dir
    pub backup_dir: Option<PathBuf>,
    /// Feature extraction window parameters
    pub features: FeaturesConfig,
    /// Rule weights and trigger thresholds
    pub rules: RulesConfig,
    /// Scoring strategy selection
    pub scoring: ScoringConfig,
    /// Alert emission and auto-action thresholds
    pub dispatch: DispatchConfig,
    /// Action executor limits
    pub actions: ActionsConfig,
    /// Control API
    pub api: ApiConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Sliding window for behavioral stats (seconds)
    pub window_secs: u64,
    /// Entropy above this counts as a high-entropy write
    pub high_entropy_threshold: f64,
    /// Max bytes read when sampling a file's entropy
    pub entropy_sample_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Write burst: more than this many writes...
    pub write_burst_count: u32,
    /// ...inside a window shorter than this (seconds)
    pub write_burst_window_secs: u64,
    pub write_burst_weight: f64,
    /// Extension changes above this count trigger
    pub extension_change_count: u32,
    pub extension_change_weight: f64,
    /// High-entropy writes above this count trigger
    pub high_entropy_count: u32,
    pub high_entropy_weight: f64,
    /// Suspicious process-name match weight
    pub process_name_weight: f64,
    /// A ransom-note creation raises confidence to at least this
    pub ransom_note_floor: f64,
    /// Accumulated confidence is capped here
    pub confidence_cap: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategyKind {
    Rules,
    Inference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub strategy: ScoringStrategyKind,
    /// Endpoint for the external inference strategy
    pub inference_endpoint: Option<String>,
    /// Hard timeout on an inference call before falling back to rules
    pub inference_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// No alert is emitted below this confidence
    pub alert_floor: f64,
    /// Auto-block above this confidence (encryption / AI categories)
    pub auto_block_confidence: f64,
    /// Identical alert details are suppressed within this window (seconds)
    pub dedup_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// Hard timeout for a process block (seconds)
    pub process_timeout_secs: u64,
    /// Hard timeout for a backup run (seconds)
    pub backup_timeout_secs: u64,
    /// Periodic backup interval (seconds)
    pub backup_interval_secs: u64,
    /// Bounded concurrency for the executor pool
    pub max_concurrent: usize,
    /// Record blocks without touching real processes (demo deployments)
    pub simulate_process_actions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address for the control API
    pub bind: String,
    /// Lines returned by the log-tail endpoints
    pub log_tail_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
    /// Detector log file (dashboard-parsed line grammar)
    pub detector_log: PathBuf,
    /// Simulation log file
    pub simulation_log: PathBuf,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ransomguard"),
            monitored_dir: PathBuf::from("monitored_documents"),
            backup_dir: None,
            features: FeaturesConfig::default(),
            rules: RulesConfig::default(),
            scoring: ScoringConfig::default(),
            dispatch: DispatchConfig::default(),
            actions: ActionsConfig::default(),
            api: ApiConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            window_secs: 300,
            high_entropy_threshold: 0.8,
            entropy_sample_bytes: 64 * 1024,
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            write_burst_count: 50,
            write_burst_window_secs: 60,
            write_burst_weight: 0.3,
            extension_change_count: 10,
            extension_change_weight: 0.4,
            high_entropy_count: 5,
            high_entropy_weight: 0.5,
            process_name_weight: 0.3,
            ransom_note_floor: 0.85,
            confidence_cap: 0.95,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            strategy: ScoringStrategyKind::Rules,
            inference_endpoint: None,
            inference_timeout_secs: 5,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            alert_floor: 0.3,
            auto_block_confidence: 0.85,
            dedup_window_secs: 300,
        }
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            process_timeout_secs: 10,
            backup_timeout_secs: 60,
            backup_interval_secs: 300,
            max_concurrent: 4,
            simulate_process_actions: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5001".to_string(),
            log_tail_lines: 100,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            detector_log: PathBuf::from("ransomware_detection.log"),
            simulation_log: PathBuf::from("ransomware_simulation.log"),
        }
    }
}

impl DetectorConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if path.exists() {
            if let Ok(data) = std::fs::read_to_string(path) {
                if let Ok(c) = serde_json::from_str::<DetectorConfig>(&data) {
                    return c;
                }
            }
        }
        Self::default()
    }

    /// Backup root: configured path, or `_detector_backups` beside the monitored dir
    pub fn backup_root(&self) -> PathBuf {
        match &self.backup_dir {
            Some(p) => p.clone(),
            None => self
                .monitored_dir
                .parent()
                .unwrap_or(std::path::Path::new("."))
                .join("_detector_backups"),
        }
    }
}
