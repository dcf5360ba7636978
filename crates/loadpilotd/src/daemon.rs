//! Subsystem assembly for `loadpilotd run`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};

use loadpilot_api::{BroadcastHub, CollectionLoop};
use loadpilot_autoscale::AutoscalerController;
use loadpilot_metrics::HostSampler;
use loadpilot_queue::{InMemoryQueue, PueueCli, QueueCommandPort};

use crate::RunArgs;

/// Tasks the dry-run queue starts with.
const DRY_RUN_TASKS: &[u64] = &[1, 2, 3, 4];

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = args.autoscale_config();
    config.validate().context("invalid autoscaler configuration")?;

    if args.dry_run {
        warn!(tasks = ?DRY_RUN_TASKS, "dry run: driving an in-memory queue, pueue is not touched");
        serve(InMemoryQueue::with_running(DRY_RUN_TASKS), args).await
    } else {
        let port = PueueCli::new(&args.pueue_bin).with_timeout(args.command_timeout());
        info!(bin = %args.pueue_bin.display(), "using pueue");
        serve(port, args).await
    }
}

async fn serve<P: QueueCommandPort>(port: P, args: RunArgs) -> anyhow::Result<()> {
    info!("loadpilot daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let config = args.autoscale_config();
    info!(
        cpu_low = config.cpu_low,
        cpu_high = config.cpu_high,
        cpu_resume = config.cpu_resume,
        min_parallel = config.min_parallel,
        max_parallel = config.max_parallel,
        mode = %args.initial_mode,
        "autoscaler initialized"
    );
    let controller =
        Arc::new(AutoscalerController::new(port, config).with_mode(args.initial_mode));

    let hub = Arc::new(BroadcastHub::new(controller, HostSampler::new()));
    let collector = CollectionLoop::new(Arc::clone(&hub), args.interval());

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let collector_handle = tokio::spawn(collector.run(shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = loadpilot_api::build_router(hub);
    let addr = SocketAddr::new(args.bind, args.port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "observer server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = collector_handle.await;

    info!("loadpilot daemon stopped");
    Ok(())
}
