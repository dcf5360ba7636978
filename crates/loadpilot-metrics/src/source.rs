//! Where host readings come from.

use std::collections::VecDeque;

use loadpilot_state::{CpuMetrics, HostMetrics, MemoryMetrics, SystemInfo};

/// Produces one [`HostMetrics`] reading per call.
///
/// Implementations must not fail: a sensor that cannot be read reports
/// zero instead.
pub trait MetricsSource: Send + 'static {
    fn collect(&mut self) -> HostMetrics;
}

/// Replays a fixed sequence of overall CPU readings.
///
/// Once the sequence is exhausted the last value repeats. Memory and
/// system figures are constant.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    pending: VecDeque<f64>,
    last: f64,
    memory: MemoryMetrics,
    system: SystemInfo,
}

impl ScriptedSource {
    pub fn new(cpu: impl IntoIterator<Item = f64>) -> Self {
        Self {
            pending: cpu.into_iter().collect(),
            last: 0.0,
            memory: MemoryMetrics {
                total: 16 * 1024 * 1024 * 1024,
                used: 4 * 1024 * 1024 * 1024,
                available: 12 * 1024 * 1024 * 1024,
                swap_total: 0,
                swap_used: 0,
            },
            system: SystemInfo {
                hostname: "scripted".to_string(),
                uptime: "0d 0h 0m".to_string(),
                uptime_seconds: 0,
                loadavg: Default::default(),
                cpu_count: 4,
            },
        }
    }

    /// A source that always reports `cpu`.
    pub fn constant(cpu: f64) -> Self {
        Self::new([cpu])
    }

    pub fn with_memory(mut self, memory: MemoryMetrics) -> Self {
        self.memory = memory;
        self
    }

    /// Queue more readings behind the ones not yet replayed.
    pub fn extend(&mut self, cpu: impl IntoIterator<Item = f64>) {
        self.pending.extend(cpu);
    }
}

impl MetricsSource for ScriptedSource {
    fn collect(&mut self) -> HostMetrics {
        if let Some(next) = self.pending.pop_front() {
            self.last = next;
        }
        HostMetrics {
            cpu: CpuMetrics {
                overall: self.last,
                cores: vec![self.last; self.system.cpu_count],
            },
            memory: self.memory.clone(),
            system: self.system.clone(),
        }
    }
}
