//! Domain types shared by the loadpilot crates.
//!
//! These types describe the autoscaler's observable state, the host
//! metrics gathered every tick, and the task queue as seen through its
//! status command. They are serialized verbatim into observer messages.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Identifier of a task inside the external queue.
pub type TaskId = u64;

// ── Autoscaler ────────────────────────────────────────────────────

/// Who is in charge of the queue's concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The operator sets concurrency; the autoscaler only observes.
    #[default]
    Manual,
    /// The autoscaler pauses, resumes, and resizes on every tick.
    Auto,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Manual => write!(f, "manual"),
            Mode::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Mode::Manual),
            "auto" => Ok(Mode::Auto),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Thresholds and bounds for the hysteresis controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscaleConfig {
    /// Median CPU below which concurrency may grow (no paused tasks).
    pub cpu_low: f64,
    /// Instantaneous CPU above which the newest task is paused.
    pub cpu_high: f64,
    /// Median CPU below which a paused task is resumed.
    pub cpu_resume: f64,
    pub min_parallel: u32,
    pub max_parallel: u32,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            cpu_low: 60.0,
            cpu_high: 80.0,
            cpu_resume: 60.0,
            min_parallel: 1,
            max_parallel: 12,
        }
    }
}

impl AutoscaleConfig {
    /// Check the bounds and threshold ordering.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_parallel == 0 {
            return Err(ConfigError::MinParallelZero(self.min_parallel));
        }
        if self.min_parallel > self.max_parallel {
            return Err(ConfigError::ParallelRange {
                min: self.min_parallel,
                max: self.max_parallel,
            });
        }
        for (name, value) in [
            ("cpu_low", self.cpu_low),
            ("cpu_high", self.cpu_high),
            ("cpu_resume", self.cpu_resume),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.cpu_low > self.cpu_high {
            return Err(ConfigError::ThresholdOrder {
                low: self.cpu_low,
                high: self.cpu_high,
            });
        }
        Ok(())
    }

    /// Clamp a requested concurrency into `[min_parallel, max_parallel]`.
    pub fn clamp_parallel(&self, value: i64) -> u32 {
        value.clamp(self.min_parallel as i64, self.max_parallel as i64) as u32
    }
}

/// Read-only view of the autoscaler, broadcast to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerState {
    pub mode: Mode,
    /// Tasks paused by the autoscaler, most recently paused last.
    pub paused_tasks: Vec<TaskId>,
    pub cpu_median: Option<f64>,
    /// Description of what the latest tick did, if anything.
    pub last_action: Option<String>,
    pub config: AutoscaleConfig,
}

// ── Host metrics ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuMetrics {
    /// Whole-machine utilization in percent.
    pub overall: f64,
    pub cores: Vec<f64>,
}

/// Memory figures in bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetrics {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub swap_total: u64,
    pub swap_used: u64,
}

impl MemoryMetrics {
    /// Used memory as a percentage, one decimal place.
    pub fn used_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        round_to(self.used as f64 / self.total as f64 * 100.0, 1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    #[serde(rename = "1m")]
    pub one: f64,
    #[serde(rename = "5m")]
    pub five: f64,
    #[serde(rename = "15m")]
    pub fifteen: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub hostname: String,
    /// Human-readable uptime such as `3d 4h 12m`.
    pub uptime: String,
    pub uptime_seconds: u64,
    pub loadavg: LoadAverage,
    pub cpu_count: usize,
}

/// One reading of the host, produced by a `MetricsSource` every tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMetrics {
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub system: SystemInfo,
}

// ── Queue ─────────────────────────────────────────────────────────

/// How a finished task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskResult {
    Success,
    /// Non-zero exit code.
    Failed(i32),
    FailedToSpawn,
    Killed,
    Errored,
    DependencyFailed,
}

/// Lifecycle state of a queued task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum TaskStatus {
    Queued,
    Running {
        start: Option<DateTime<FixedOffset>>,
    },
    Paused {
        start: Option<DateTime<FixedOffset>>,
    },
    Done {
        start: Option<DateTime<FixedOffset>>,
        end: Option<DateTime<FixedOffset>>,
        result: TaskResult,
    },
    Stashed,
    Locked,
}

impl TaskStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, TaskStatus::Running { .. })
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Done { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "Queued",
            TaskStatus::Running { .. } => "Running",
            TaskStatus::Paused { .. } => "Paused",
            TaskStatus::Done { .. } => "Done",
            TaskStatus::Stashed => "Stashed",
            TaskStatus::Locked => "Locked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub id: TaskId,
    pub command: String,
    pub path: String,
    pub status: TaskStatus,
}

/// Per-group summary as reported by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    /// Group state label, e.g. `Running` or `Paused`.
    pub status: String,
    /// Configured concurrency for the group.
    pub parallel: u32,
}

/// Name of the group the autoscaler controls.
pub const DEFAULT_GROUP: &str = "default";

/// Decoded output of the queue's status command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub groups: BTreeMap<String, GroupSummary>,
    /// Tasks, highest id first.
    pub tasks: Vec<TaskInfo>,
}

impl QueueStatus {
    /// Ids of running tasks in ascending order.
    pub fn running_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|t| t.status.is_running())
            .map(|t| t.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Configured concurrency of the default group, if it exists.
    pub fn default_parallel(&self) -> Option<u32> {
        self.groups.get(DEFAULT_GROUP).map(|g| g.parallel)
    }
}

// ── History ───────────────────────────────────────────────────────

/// One point of the CPU/memory trend shown to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// Round `value` to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
