//! Prometheus text exposition format.
//!
//! Renders the latest host reading and the autoscaler state for scraping
//! by a Prometheus server or compatible agent.

use std::fmt::Write;

use loadpilot_state::{AutoscalerState, HostMetrics, Mode};

/// Render host metrics and autoscaler state into Prometheus text format.
pub fn render_prometheus(host: &HostMetrics, autoscaler: &AutoscalerState) -> String {
    let mut out = String::new();

    gauge(
        &mut out,
        "loadpilot_cpu_percent",
        "Overall CPU utilization in percent.",
        format!("{:.1}", host.cpu.overall),
    );

    out.push_str("# HELP loadpilot_cpu_core_percent Per-core CPU utilization in percent.\n");
    out.push_str("# TYPE loadpilot_cpu_core_percent gauge\n");
    for (core, usage) in host.cpu.cores.iter().enumerate() {
        let _ = writeln!(out, "loadpilot_cpu_core_percent{{core=\"{core}\"}} {usage:.1}");
    }

    gauge(
        &mut out,
        "loadpilot_memory_used_percent",
        "Used memory in percent of total.",
        format!("{:.1}", host.memory.used_percent()),
    );
    gauge(
        &mut out,
        "loadpilot_memory_used_bytes",
        "Used memory in bytes.",
        host.memory.used.to_string(),
    );

    out.push_str("# HELP loadpilot_load_average System load average.\n");
    out.push_str("# TYPE loadpilot_load_average gauge\n");
    let load = &host.system.loadavg;
    for (window, value) in [("1m", load.one), ("5m", load.five), ("15m", load.fifteen)] {
        let _ = writeln!(out, "loadpilot_load_average{{window=\"{window}\"}} {value:.2}");
    }

    // An absent median is left out rather than reported as zero.
    out.push_str("# HELP loadpilot_cpu_median_percent Median CPU over the load window.\n");
    out.push_str("# TYPE loadpilot_cpu_median_percent gauge\n");
    if let Some(median) = autoscaler.cpu_median {
        let _ = writeln!(out, "loadpilot_cpu_median_percent {median:.1}");
    }

    gauge(
        &mut out,
        "loadpilot_paused_tasks",
        "Tasks currently paused by the autoscaler.",
        autoscaler.paused_tasks.len().to_string(),
    );
    gauge(
        &mut out,
        "loadpilot_autoscaler_auto",
        "1 when the autoscaler is in auto mode, 0 in manual mode.",
        u8::from(autoscaler.mode == Mode::Auto).to_string(),
    );

    out
}

fn gauge(out: &mut String, name: &str, help: &str, value: String) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}
