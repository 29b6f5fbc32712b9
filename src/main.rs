//! RansomGuard agent entrypoint: wires the detector pipeline and serves the
//! control API the dashboard talks to. The detector itself starts on demand
//! via POST /detector/start.

use ransomguard_agent::{
    api::{self, AppState},
    config::DetectorConfig,
    lifecycle::DetectorController,
    logging::{DetectorLog, StructuredLogger},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("RANSOMGUARD_CONFIG_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let config = DetectorConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(
        monitored = %config.monitored_dir.display(),
        data_dir = %config.data_dir.display(),
        "RansomGuard agent starting"
    );

    std::fs::create_dir_all(&config.monitored_dir)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let detector_log = Arc::new(DetectorLog::new(config.log.detector_log.clone()));
    let simulation_log = Arc::new(DetectorLog::new(config.log.simulation_log.clone()));

    let bind = config.api.bind.clone();
    let controller = DetectorController::from_config(config, detector_log.clone());

    let state = AppState {
        controller: controller.clone(),
        detector_log,
        simulation_log,
    };

    api::serve(state, &bind).await?;

    // graceful teardown: drain the pipeline if it is still running
    controller.stop().await;
    info!("RansomGuard agent stopped");
    Ok(())
}
