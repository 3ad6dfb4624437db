//! Performance monitoring configuration.
//!
//! Thresholds, baseline requirements, and monitoring behaviour persist as
//! JSON under the storage directory (default
//! `.codexplus/performance/config.json`), with environment variables as the
//! final override layer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const ENV_MONITORING: &str = "CODEX_PERFORMANCE_MONITORING";
pub const ENV_COORDINATION_THRESHOLD_MS: &str = "CODEX_COORDINATION_THRESHOLD_MS";
pub const ENV_BASELINE_MIN_SAMPLES: &str = "CODEX_BASELINE_MIN_SAMPLES";
pub const ENV_BASELINE_MEASUREMENT_HOURS: &str = "CODEX_BASELINE_MEASUREMENT_HOURS";
pub const ENV_CI_EXPORT_FILE: &str = "CODEX_CI_EXPORT_FILE";
pub const ENV_CI_FAIL_ON_VIOLATION: &str = "CODEX_CI_FAIL_ON_VIOLATION";

/// Duration thresholds in milliseconds per metric kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceThresholds {
    pub coordination_overhead_warning_ms: f64,
    pub coordination_overhead_critical_ms: f64,
    pub coordination_overhead_max_acceptable_ms: f64,
    pub task_execution_warning_ms: f64,
    pub task_execution_critical_ms: f64,
    pub agent_init_warning_ms: f64,
    pub agent_init_critical_ms: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            coordination_overhead_warning_ms: 150.0,
            coordination_overhead_critical_ms: 200.0,
            coordination_overhead_max_acceptable_ms: 250.0,
            task_execution_warning_ms: 1000.0,
            task_execution_critical_ms: 2000.0,
            agent_init_warning_ms: 50.0,
            agent_init_critical_ms: 100.0,
        }
    }
}

/// Requirements for establishing a baseline snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub measurement_period_hours: f64,
    pub min_samples_for_baseline: usize,
    pub confidence_interval: f64,
    pub min_success_rate: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            measurement_period_hours: 1.0,
            min_samples_for_baseline: 100,
            confidence_interval: 0.95,
            min_success_rate: 0.90,
        }
    }
}

/// Monitoring behaviour: buffer size, storage, CI export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub max_metrics_in_memory: usize,
    pub storage_dir: PathBuf,
    pub ci_export_enabled: bool,
    pub ci_export_file: String,
    pub ci_fail_on_threshold_violation: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_metrics_in_memory: 10_000,
            storage_dir: PathBuf::from(".codexplus/performance"),
            ci_export_enabled: true,
            ci_export_file: "performance_metrics.json".to_string(),
            ci_fail_on_threshold_violation: true,
        }
    }
}

/// Complete performance monitoring configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub thresholds: PerformanceThresholds,
    pub baseline: BaselineConfig,
    pub monitoring: MonitoringConfig,
}

impl PerformanceConfig {
    /// `<storage_dir>/config.json`.
    pub fn config_path(&self) -> PathBuf {
        self.monitoring.storage_dir.join("config.json")
    }

    /// Loads from `path`, falling back to defaults (and writing them out)
    /// when the file is missing or unreadable. Environment overrides are
    /// applied last.
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("invalid performance config {}: {e}; using defaults", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                debug!("no performance config at {}; writing defaults", path.display());
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    debug!("could not persist default performance config: {e}");
                }
                config
            }
        };
        config.apply_env_overrides();
        config
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Environment variables override file values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(enabled) = env_bool(ENV_MONITORING) {
            self.monitoring.enabled = enabled;
        }
        if let Some(threshold) = env_parse::<f64>(ENV_COORDINATION_THRESHOLD_MS) {
            self.thresholds.coordination_overhead_critical_ms = threshold;
        }
        if let Some(samples) = env_parse::<usize>(ENV_BASELINE_MIN_SAMPLES) {
            self.baseline.min_samples_for_baseline = samples;
        }
        if let Some(hours) = env_parse::<f64>(ENV_BASELINE_MEASUREMENT_HOURS) {
            self.baseline.measurement_period_hours = hours;
        }
        if let Ok(file) = std::env::var(ENV_CI_EXPORT_FILE) {
            if !file.trim().is_empty() {
                self.monitoring.ci_export_file = file.trim().to_string();
            }
        }
        if let Some(fail) = env_bool(ENV_CI_FAIL_ON_VIOLATION) {
            self.monitoring.ci_fail_on_threshold_violation = fail;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_bool(key: &str) -> Option<bool> {
    match std::env::var(key).ok()?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
