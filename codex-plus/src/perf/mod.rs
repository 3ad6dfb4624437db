//! Performance metric sink.
//!
//! In-memory ring buffer of recent metric events with summary validation
//! against the sub-200ms coordination-overhead requirement, baseline
//! establishment, and a CI export. The buffer is the only mutable shared
//! structure in the proxy besides the hook-registry pointer; a mutex guards
//! appends.

mod config;

pub use config::{
    BaselineConfig, MonitoringConfig, PerformanceConfig, PerformanceThresholds,
    ENV_BASELINE_MEASUREMENT_HOURS, ENV_BASELINE_MIN_SAMPLES, ENV_CI_EXPORT_FILE,
    ENV_CI_FAIL_ON_VIOLATION, ENV_COORDINATION_THRESHOLD_MS, ENV_MONITORING,
};

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// Metric kinds the proxy emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    CoordinationOverhead,
    TaskExecution,
    AgentInit,
    ParallelCoordination,
}

/// One timing measurement with free-form context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    pub kind: MetricKind,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub wall_clock: DateTime<Utc>,
}

impl MetricEvent {
    /// An event is a failure only when its context says `"success": false`.
    fn is_success(&self) -> bool {
        self.context.get("success").and_then(Value::as_bool) != Some(false)
    }
}

/// Summary over the recent coordination-overhead window.
#[derive(Debug, Clone, Serialize)]
pub struct RequirementsSummary {
    pub samples: usize,
    pub mean_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub threshold_ms: f64,
    pub meets_sub_200ms_requirement: bool,
}

/// Baseline snapshot persisted for later comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    pub coordination_overhead_ms: f64,
    pub task_execution_ms: f64,
    pub agent_init_ms: f64,
    pub samples: usize,
    pub ci: f64,
    pub established_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("not enough samples in window: have {have}, need {need}")]
    NotEnoughSamples { have: usize, need: usize },
    #[error("success rate {0:.2} below required minimum")]
    LowSuccessRate(f64),
    #[error("persist baseline: {0}")]
    Io(#[from] std::io::Error),
}

/// Mutex-guarded ring buffer of the most recent metric events.
pub struct PerformanceMonitor {
    config: PerformanceConfig,
    events: Mutex<VecDeque<MetricEvent>>,
}

impl PerformanceMonitor {
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    /// Appends one event; the oldest event falls off past the cap.
    pub fn record(&self, kind: MetricKind, duration_ms: f64, context: Map<String, Value>) {
        self.record_event(MetricEvent {
            kind,
            duration_ms,
            agent_id: None,
            task_id: None,
            context,
            wall_clock: Utc::now(),
        });
    }

    pub fn record_event(&self, event: MetricEvent) {
        if !self.config.monitoring.enabled {
            return;
        }
        let Ok(mut events) = self.events.lock() else {
            warn!("metric buffer lock poisoned; dropping event");
            return;
        };
        events.push_back(event);
        while events.len() > self.config.monitoring.max_metrics_in_memory {
            events.pop_front();
        }
    }

    fn snapshot(&self) -> Vec<MetricEvent> {
        self.events
            .lock()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Validates coordination overhead over the buffered window. With no
    /// samples there is nothing violating, so the requirement holds.
    pub fn validate_requirements(&self) -> RequirementsSummary {
        let durations: Vec<f64> = self
            .snapshot()
            .iter()
            .filter(|e| e.kind == MetricKind::CoordinationOverhead)
            .map(|e| e.duration_ms)
            .collect();
        let threshold = self.config.thresholds.coordination_overhead_critical_ms;
        let samples = durations.len();
        let mean = if samples == 0 {
            0.0
        } else {
            durations.iter().sum::<f64>() / samples as f64
        };
        let p95 = percentile(&durations, 0.95);
        let p99 = percentile(&durations, 0.99);
        RequirementsSummary {
            samples,
            mean_ms: mean,
            p95_ms: p95,
            p99_ms: p99,
            threshold_ms: threshold,
            meets_sub_200ms_requirement: samples == 0 || p95 < threshold,
        }
    }

    /// Establishes a baseline over the trailing `window`. Requires at least
    /// `min_samples` events and the configured success rate.
    pub fn establish_baseline(
        &self,
        window: Duration,
        min_samples: usize,
        ci: f64,
    ) -> Result<PerformanceBaseline, BaselineError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(1));
        let events: Vec<MetricEvent> = self
            .snapshot()
            .into_iter()
            .filter(|e| e.wall_clock >= cutoff)
            .collect();

        if events.len() < min_samples {
            return Err(BaselineError::NotEnoughSamples {
                have: events.len(),
                need: min_samples,
            });
        }
        let successes = events.iter().filter(|e| e.is_success()).count();
        let success_rate = successes as f64 / events.len() as f64;
        if success_rate < self.config.baseline.min_success_rate {
            return Err(BaselineError::LowSuccessRate(success_rate));
        }

        let baseline = PerformanceBaseline {
            coordination_overhead_ms: mean_for(&events, MetricKind::CoordinationOverhead),
            task_execution_ms: mean_for(&events, MetricKind::TaskExecution),
            agent_init_ms: mean_for(&events, MetricKind::AgentInit),
            samples: events.len(),
            ci,
            established_at: Utc::now(),
        };
        self.persist_baseline(&baseline)?;
        Ok(baseline)
    }

    fn persist_baseline(&self, baseline: &PerformanceBaseline) -> std::io::Result<()> {
        let path = self.baseline_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(baseline).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.config.monitoring.storage_dir.join("baseline.json")
    }

    /// Writes `{summary, meets_requirements}` JSON for a CI gate.
    pub fn export_for_ci(&self, path: &Path) -> std::io::Result<()> {
        let summary = self.validate_requirements();
        let report = serde_json::json!({
            "summary": summary,
            "meets_requirements": summary.meets_sub_200ms_requirement,
            "generated_at": Utc::now(),
        });
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&report).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

fn mean_for(events: &[MetricEvent], kind: MetricKind) -> f64 {
    let durations: Vec<f64> = events
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.duration_ms)
        .collect();
    if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    }
}

/// Nearest-rank percentile; 0.0 for an empty sample.
fn percentile(durations: &[f64], q: f64) -> f64 {
    if durations.is_empty() {
        return 0.0;
    }
    let mut sorted = durations.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((q * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}
