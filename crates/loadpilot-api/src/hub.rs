//! Broadcast hub — fans state out to observers and routes their commands.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use loadpilot_autoscale::AutoscalerController;
use loadpilot_metrics::MetricsSource;
use loadpilot_queue::{DEFAULT_LOG_LINES, QueueCommandPort};
use loadpilot_state::{HistoryBuffer, HistoryEntry, HostMetrics, QueueStatus};

use crate::protocol::{ClientCommand, Frame, ProtocolError, ServerMessage, Snapshot};

/// Frames buffered per observer before a slow one starts skipping.
pub const BROADCAST_CAPACITY: usize = 64;

/// A freshly connected observer: its `initial` frame and its feed.
pub struct Observer {
    pub initial: Frame,
    pub feed: broadcast::Receiver<Frame>,
}

/// Shared by the collection loop and every observer connection.
pub struct BroadcastHub<P> {
    controller: Arc<AutoscalerController<P>>,
    history: RwLock<HistoryBuffer>,
    source: Mutex<Box<dyn MetricsSource>>,
    /// Most recent reading taken by [`BroadcastHub::sample`]; zeroed until
    /// the first tick.
    latest: RwLock<HostMetrics>,
    tx: broadcast::Sender<Frame>,
}

impl<P: QueueCommandPort> BroadcastHub<P> {
    pub fn new(controller: Arc<AutoscalerController<P>>, source: impl MetricsSource) -> Self {
        Self::with_history(controller, source, HistoryBuffer::new())
    }

    pub fn with_history(
        controller: Arc<AutoscalerController<P>>,
        source: impl MetricsSource,
        history: HistoryBuffer,
    ) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            controller,
            history: RwLock::new(history),
            source: Mutex::new(Box::new(source)),
            latest: RwLock::new(HostMetrics::default()),
            tx,
        }
    }

    pub fn controller(&self) -> &AutoscalerController<P> {
        &self.controller
    }

    /// Receive every frame published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Take one reading from the metrics source.
    pub fn sample(&self) -> HostMetrics {
        let metrics = self
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .collect();
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = metrics.clone();
        metrics
    }

    /// The last reading, without sampling again.
    pub fn latest_metrics(&self) -> HostMetrics {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Append to the trend history. Only the collection loop writes.
    pub fn record(&self, entry: HistoryEntry) {
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub fn history_len(&self) -> usize {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Queue status, or an empty one if the queue cannot be reached.
    pub async fn queue_status(&self) -> QueueStatus {
        match self.controller.port().status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "failed to query queue status");
                QueueStatus::default()
            }
        }
    }

    /// Merge a host reading with the current queue and autoscaler state.
    pub async fn snapshot_from(&self, metrics: HostMetrics) -> Snapshot {
        let queue = self.queue_status().await;
        Snapshot {
            timestamp: Utc::now(),
            memory_used_percent: metrics.memory.used_percent(),
            cpu: metrics.cpu,
            memory: metrics.memory,
            queue,
            system: metrics.system,
            autoscaler: self.controller.state(),
        }
    }

    /// Snapshot from the last host reading and a fresh queue status.
    ///
    /// Does not sample the host, tick the autoscaler, or touch the history;
    /// only the collection loop consumes readings.
    pub async fn current(&self) -> Snapshot {
        self.snapshot_from(self.latest_metrics()).await
    }

    /// Register an observer.
    ///
    /// The feed is subscribed before the initial state is computed, so a
    /// tick that lands in between is delivered rather than lost.
    pub async fn connect(&self) -> Observer {
        let feed = self.subscribe();
        let initial = ServerMessage::Initial {
            history: self.history(),
            current: self.current().await,
        };
        debug!(observers = self.observer_count(), "observer connected");
        Observer {
            initial: initial.to_frame(),
            feed,
        }
    }

    /// Send `message` to every connected observer.
    pub fn publish(&self, message: &ServerMessage) {
        let frame = message.to_frame();
        // An error only means nobody is listening.
        let delivered = self.tx.send(frame).unwrap_or(0);
        debug!(kind = message.kind(), delivered, "broadcast");
    }

    /// Handle one text frame from an observer. Returns the reply meant for
    /// that observer alone, if any.
    pub async fn handle_text(&self, text: &str) -> Option<ServerMessage> {
        match ClientCommand::parse(text) {
            Ok(command) => self.handle_command(command).await,
            Err(e) => Some(self.reject(e)),
        }
    }

    /// Log a bad frame and build the `error` reply for it.
    pub fn reject(&self, error: ProtocolError) -> ServerMessage {
        warn!(error = %error, "dropping observer frame");
        ServerMessage::error(error.to_string())
    }

    pub async fn handle_command(&self, command: ClientCommand) -> Option<ServerMessage> {
        debug!(?command, "observer command");
        match command {
            ClientCommand::SetMode { mode } => {
                self.controller.set_mode(mode).await;
                self.publish_autoscaler().await;
                None
            }
            ClientCommand::SetConcurrency { value } => {
                if self.controller.set_concurrency(value).await.is_none() {
                    info!(value, "concurrency change ignored outside manual mode");
                }
                self.publish_autoscaler().await;
                None
            }
            ClientCommand::FetchTaskLog { task_id } => {
                let log = match self
                    .controller
                    .port()
                    .task_log(task_id, DEFAULT_LOG_LINES)
                    .await
                {
                    Ok(log) if log.is_empty() => "No output".to_string(),
                    Ok(log) => log,
                    Err(e) => {
                        warn!(task_id, error = %e, "failed to fetch task log");
                        format!("Error: {e}")
                    }
                };
                Some(ServerMessage::TaskLog { task_id, log })
            }
            ClientCommand::CleanFinished => {
                let ok = match self.controller.port().clean_finished().await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "failed to clean finished tasks");
                        false
                    }
                };
                let update = ServerMessage::Update(self.current().await);
                self.publish(&update);
                Some(ServerMessage::CleanFinished { ok })
            }
        }
    }

    async fn publish_autoscaler(&self) {
        let groups = self.queue_status().await.groups;
        self.publish(&ServerMessage::Autoscaler {
            state: self.controller.state(),
            groups: Some(groups),
        });
    }
}
