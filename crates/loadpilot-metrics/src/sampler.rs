//! sysinfo-backed host sampler.

use sysinfo::System;
use tracing::trace;

use loadpilot_state::{
    CpuMetrics, HostMetrics, LoadAverage, MemoryMetrics, SystemInfo, round_to,
};

use crate::source::MetricsSource;

/// Reads CPU, memory, and load figures of the local machine.
///
/// CPU usage is measured between two refreshes, so the first reading after
/// construction covers the time since [`HostSampler::new`].
pub struct HostSampler {
    system: System,
    hostname: String,
}

impl std::fmt::Debug for HostSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSampler")
            .field("hostname", &self.hostname)
            .finish_non_exhaustive()
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();
        Self {
            system,
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl MetricsSource for HostSampler {
    fn collect(&mut self) -> HostMetrics {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();

        let overall = round_to(f64::from(self.system.global_cpu_usage()), 1);
        let cores: Vec<f64> = self
            .system
            .cpus()
            .iter()
            .map(|cpu| round_to(f64::from(cpu.cpu_usage()), 1))
            .collect();

        let load = System::load_average();
        let uptime_seconds = System::uptime();

        trace!(cpu = overall, cores = cores.len(), "sampled host");

        HostMetrics {
            memory: MemoryMetrics {
                total: self.system.total_memory(),
                used: self.system.used_memory(),
                available: self.system.available_memory(),
                swap_total: self.system.total_swap(),
                swap_used: self.system.used_swap(),
            },
            system: SystemInfo {
                hostname: self.hostname.clone(),
                uptime: format_uptime(uptime_seconds),
                uptime_seconds,
                loadavg: LoadAverage {
                    one: round_to(load.one, 2),
                    five: round_to(load.five, 2),
                    fifteen: round_to(load.fifteen, 2),
                },
                cpu_count: cores.len(),
            },
            cpu: CpuMetrics { overall, cores },
        }
    }
}

/// Render seconds as `Nd Nh Nm`.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3_600;
    let minutes = seconds % 3_600 / 60;
    format!("{days}d {hours}h {minutes}m")
}
