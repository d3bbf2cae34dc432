use crate::decision::EngineConfig;
use anyhow::{bail, Result};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Engine thresholds shared between the HTTP API and the evaluation cycle.
/// Changes via PUT /api/settings/threshold take effect on the next evaluation.
pub type SharedEngineConfig = Arc<RwLock<EngineConfig>>;

pub fn new_engine_config(initial: EngineConfig) -> SharedEngineConfig {
    Arc::new(RwLock::new(initial))
}

/// Copy of the current thresholds for one evaluation.
pub fn engine_snapshot(shared: &SharedEngineConfig) -> EngineConfig {
    *shared.read().expect("EngineConfig lock poisoned")
}

/// Replace the charge threshold. Rejects values outside 0..=100.
///
/// Returns the updated config on success.
pub fn update_threshold(shared: &SharedEngineConfig, new_threshold: f64) -> Result<EngineConfig> {
    if !(0.0..=100.0).contains(&new_threshold) {
        bail!("Threshold must be between 0 and 100");
    }

    let mut cfg = shared.write().expect("EngineConfig lock poisoned");
    let old = cfg.charge_threshold;
    cfg.charge_threshold = new_threshold;

    info!(old = old, new = new_threshold, "Charge threshold updated");

    Ok(*cfg)
}
