//! loadpilotd — the loadpilot daemon.
//!
//! Single binary that assembles every loadpilot subsystem:
//! - Host sampler (sysinfo)
//! - Queue port (`pueue` CLI, or an in-memory queue for dry runs)
//! - Autoscaler controller
//! - Collection loop
//! - Observer WebSocket hub + HTTP routes
//!
//! # Usage
//!
//! ```text
//! loadpilotd run --port 10453 --pueue-bin /usr/local/bin/pueue
//! ```

mod daemon;

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use loadpilot_state::{AutoscaleConfig, Mode};

const DEFAULT_LOG_FILTER: &str = "info,loadpilotd=debug,loadpilot=debug";

#[derive(Parser)]
#[command(name = "loadpilotd", about = "CPU-driven autoscaler for a pueue task queue")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the collection loop and serve observers.
    Run(RunArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 10453)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Path to the pueue binary.
    #[arg(long, env = "PUEUE_BIN", default_value = "pueue")]
    pub pueue_bin: PathBuf,

    /// Collection period in milliseconds.
    #[arg(long, default_value_t = 3000)]
    pub interval_ms: u64,

    /// Timeout for each pueue invocation in milliseconds.
    #[arg(long, default_value_t = 5000)]
    pub command_timeout_ms: u64,

    /// Median CPU below which concurrency may grow.
    #[arg(long, default_value_t = 60.0)]
    pub cpu_low: f64,

    /// CPU above which the newest task is paused.
    #[arg(long, default_value_t = 80.0)]
    pub cpu_high: f64,

    /// Median CPU below which paused tasks are resumed.
    #[arg(long, default_value_t = 60.0)]
    pub cpu_resume: f64,

    #[arg(long, default_value_t = 1)]
    pub min_parallel: u32,

    #[arg(long, default_value_t = 12)]
    pub max_parallel: u32,

    /// Mode to start in (`manual` or `auto`).
    #[arg(long, default_value = "manual")]
    pub initial_mode: Mode,

    /// Drive an in-memory queue instead of pueue.
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    pub fn autoscale_config(&self) -> AutoscaleConfig {
        AutoscaleConfig {
            cpu_low: self.cpu_low,
            cpu_high: self.cpu_high,
            cpu_resume: self.cpu_resume,
            min_parallel: self.min_parallel,
            max_parallel: self.max_parallel,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms.max(1))
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run(args) => daemon::run(args).await,
    }
}
