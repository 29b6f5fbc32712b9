//! Logging: tracing subscriber setup plus the plain-text detector log whose
//! line grammar downstream consumers parse.

mod detector_log;
mod format;

pub use detector_log::{read_last_log_lines, DetectorLog, LogLevel, LogLine};
pub use format::StructuredLogger;
