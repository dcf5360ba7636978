//! HTTP handlers next to the WebSocket: state, metrics, and health.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use loadpilot_queue::QueueCommandPort;
use loadpilot_state::AutoscalerState;

use crate::hub::BroadcastHub;

/// Body of `GET /api/v1/state`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub autoscaler: AutoscalerState,
    pub history_len: usize,
    pub observers: usize,
}

/// GET /api/v1/state
pub async fn get_state<P: QueueCommandPort>(
    State(hub): State<Arc<BroadcastHub<P>>>,
) -> Json<StateResponse> {
    Json(StateResponse {
        autoscaler: hub.controller().state(),
        history_len: hub.history_len(),
        observers: hub.observer_count(),
    })
}

/// GET /metrics
pub async fn prometheus_metrics<P: QueueCommandPort>(
    State(hub): State<Arc<BroadcastHub<P>>>,
) -> impl IntoResponse {
    let body = loadpilot_metrics::render_prometheus(&hub.latest_metrics(), &hub.controller().state());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
