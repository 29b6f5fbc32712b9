//! Behavioral feature extraction over sliding per-process windows.

mod entropy;
mod extractor;

pub use entropy::calculate_entropy;
pub use extractor::FeatureExtractor;

use serde::{Deserialize, Serialize};

/// An extension change observed on a rename, e.g. `txt` -> `locked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionChange {
    pub from: String,
    pub to: String,
}

/// Aggregated, time-windowed view of one process's file activity.
/// Produced by [`FeatureExtractor::snapshot`]; read-only downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    /// `name:pid` identity the window is keyed by
    pub process_identity: String,
    pub process_name: String,
    pub pid: u32,
    /// Operation counts inside the window
    pub create_count: u32,
    pub modify_count: u32,
    pub delete_count: u32,
    pub rename_count: u32,
    pub permission_change_count: u32,
    /// Distinct paths touched inside the window
    pub unique_path_count: u32,
    /// Extension changes recorded from renames
    pub extension_changes: Vec<ExtensionChange>,
    /// Entropy samples from writes that carried entropy metadata
    pub entropy_samples: Vec<f64>,
    pub avg_entropy: f64,
    /// Samples above the configured high-entropy threshold
    pub high_entropy_count: u32,
    /// Milliseconds between first and last event; 0 below 2 events
    pub timespan_ms: i64,
    /// Base names of files created in the window (ransom-note detection)
    pub created_names: Vec<String>,
    /// Every path touched in the window, oldest first
    pub affected_paths: Vec<String>,
}

impl FeatureSnapshot {
    pub fn total_events(&self) -> u32 {
        self.create_count
            + self.modify_count
            + self.delete_count
            + self.rename_count
            + self.permission_change_count
    }
}
