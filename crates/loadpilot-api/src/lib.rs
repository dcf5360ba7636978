//! loadpilot-api — observer fan-out and the HTTP surface.
//!
//! The [`BroadcastHub`] is the meeting point of the [`CollectionLoop`],
//! the autoscaler, and every connected observer. Observers speak JSON over
//! a WebSocket; the rest of the routes are plain HTTP.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/ws` | Observer WebSocket |
//! | GET | `/api/v1/state` | Autoscaler state as JSON |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness |

pub mod collector;
pub mod handlers;
pub mod hub;
pub mod protocol;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use loadpilot_queue::QueueCommandPort;

pub use collector::{CollectionLoop, DEFAULT_INTERVAL};
pub use hub::{BROADCAST_CAPACITY, BroadcastHub, Observer};
pub use protocol::{ClientCommand, Frame, ProtocolError, ServerMessage, Snapshot};

/// Build the complete router (WebSocket + REST + metrics).
pub fn build_router<P: QueueCommandPort>(hub: Arc<BroadcastHub<P>>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler::<P>))
        .route("/api/v1/state", get(handlers::get_state::<P>))
        .route("/metrics", get(handlers::prometheus_metrics::<P>))
        .route("/healthz", get(handlers::healthz))
        .with_state(hub)
}
