//! Collection loop — the fixed-period driver of the whole system.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use loadpilot_queue::QueueCommandPort;
use loadpilot_state::HistoryEntry;

use crate::hub::BroadcastHub;
use crate::protocol::ServerMessage;

/// Default collection period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// Samples the host, drives the autoscaler, and broadcasts an update on
/// every tick.
pub struct CollectionLoop<P> {
    hub: Arc<BroadcastHub<P>>,
    interval: Duration,
}

impl<P: QueueCommandPort> CollectionLoop<P> {
    pub fn new(hub: Arc<BroadcastHub<P>>, interval: Duration) -> Self {
        Self { hub, interval }
    }

    /// One collection cycle. Never fails; collaborator errors are logged
    /// further down and replaced by defaults.
    pub async fn tick(&self) {
        let metrics = self.hub.sample();
        let cpu = metrics.cpu.overall;
        self.hub.record(HistoryEntry {
            timestamp: Utc::now(),
            cpu_percent: cpu,
            memory_percent: metrics.memory.used_percent(),
        });

        let outcome = self.hub.controller().tick(cpu).await;
        debug!(cpu, %outcome, "collection tick");

        let snapshot = self.hub.snapshot_from(metrics).await;
        self.hub.publish(&ServerMessage::Update(snapshot));
    }

    /// Tick every `interval` until `shutdown` flips.
    ///
    /// The first tick fires one interval after start. A firing that comes
    /// due while a tick is still running is skipped, not queued.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "collection loop started");

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("collection loop shutting down");
                    break;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }
}
