//! Observer wire protocol.
//!
//! Every frame is a JSON text message with a `type` field. Commands flow
//! from observers to the hub; everything else flows the other way.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use loadpilot_state::{
    AutoscalerState, CpuMetrics, GroupSummary, HistoryEntry, MemoryMetrics, Mode, QueueStatus,
    SystemInfo, TaskId,
};

/// A serialized server message, shared by every observer it is sent to.
pub type Frame = Arc<str>;

/// Errors decoding an observer frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed command: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("binary frames are not supported")]
    BinaryFrame,
}

/// Command sent by an observer.
///
/// The older command names are still accepted as aliases.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientCommand {
    #[serde(alias = "set-parallel-mode")]
    SetMode { mode: Mode },

    /// Fractional values are floored.
    #[serde(alias = "set-parallel")]
    SetConcurrency {
        #[serde(deserialize_with = "floored")]
        value: i64,
    },

    #[serde(alias = "get-task-log")]
    FetchTaskLog {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },

    #[serde(alias = "clean-tasks")]
    CleanFinished,
}

impl ClientCommand {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

fn floored<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Err(D::Error::custom("concurrency must be a finite number"));
    }
    // Saturates outside the i64 range; the controller clamps anyway.
    Ok(value.floor() as i64)
}

/// Merged view of the host, the queue, and the autoscaler at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub memory_used_percent: f64,
    pub queue: QueueStatus,
    pub system: SystemInfo,
    pub autoscaler: AutoscalerState,
}

/// Message sent by the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First message on every connection.
    Initial {
        history: Vec<HistoryEntry>,
        current: Snapshot,
    },
    /// Broadcast once per tick and after a cleanup.
    Update(Snapshot),
    /// Broadcast after an observer command changed the autoscaler.
    Autoscaler {
        #[serde(flatten)]
        state: AutoscalerState,
        #[serde(rename = "queueGroups", skip_serializing_if = "Option::is_none")]
        groups: Option<BTreeMap<String, GroupSummary>>,
    },
    TaskLog {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        log: String,
    },
    /// Acknowledges `clean-finished` to the observer that sent it.
    CleanFinished { ok: bool },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Initial { .. } => "initial",
            ServerMessage::Update(_) => "update",
            ServerMessage::Autoscaler { .. } => "autoscaler",
            ServerMessage::TaskLog { .. } => "task-log",
            ServerMessage::CleanFinished { .. } => "clean-finished",
            ServerMessage::Error { .. } => "error",
        }
    }

    /// Serialize into a shareable frame.
    pub fn to_frame(&self) -> Frame {
        match serde_json::to_string(self) {
            Ok(json) => Arc::from(json),
            // Only reachable if a float is non-finite; observers still get
            // a well-formed frame.
            Err(e) => Arc::from(
                serde_json::json!({ "type": "error", "message": e.to_string() }).to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadpilot_state::AutoscaleConfig;
    use serde_json::{Value, json};

    #[test]
    fn parses_every_command() {
        assert_eq!(
            ClientCommand::parse(r#"{"type":"set-mode","mode":"auto"}"#).unwrap(),
            ClientCommand::SetMode { mode: Mode::Auto }
        );
        assert_eq!(
            ClientCommand::parse(r#"{"type":"set-concurrency","value":-3}"#).unwrap(),
            ClientCommand::SetConcurrency { value: -3 }
        );
        assert_eq!(
            ClientCommand::parse(r#"{"type":"fetch-task-log","taskId":12}"#).unwrap(),
            ClientCommand::FetchTaskLog { task_id: 12 }
        );
        assert_eq!(
            ClientCommand::parse(r#"{"type":"clean-finished"}"#).unwrap(),
            ClientCommand::CleanFinished
        );
    }

    #[test]
    fn fractional_concurrency_is_floored() {
        assert_eq!(
            ClientCommand::parse(r#"{"type":"set-concurrency","value":3.5}"#).unwrap(),
            ClientCommand::SetConcurrency { value: 3 }
        );
        assert_eq!(
            ClientCommand::parse(r#"{"type":"set-parallel","value":-0.5}"#).unwrap(),
            ClientCommand::SetConcurrency { value: -1 }
        );
        assert!(ClientCommand::parse(r#"{"type":"set-concurrency","value":"4"}"#).is_err());
    }

    #[test]
    fn accepts_legacy_command_names() {
        assert_eq!(
            ClientCommand::parse(r#"{"type":"set-parallel-mode","mode":"manual"}"#).unwrap(),
            ClientCommand::SetMode { mode: Mode::Manual }
        );
        assert_eq!(
            ClientCommand::parse(r#"{"type":"set-parallel","value":4}"#).unwrap(),
            ClientCommand::SetConcurrency { value: 4 }
        );
        assert_eq!(
            ClientCommand::parse(r#"{"type":"get-task-log","taskId":1}"#).unwrap(),
            ClientCommand::FetchTaskLog { task_id: 1 }
        );
        assert_eq!(
            ClientCommand::parse(r#"{"type":"clean-tasks"}"#).unwrap(),
            ClientCommand::CleanFinished
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        for bad in [
            "not json",
            r#"{"mode":"auto"}"#,
            r#"{"type":"reboot"}"#,
            r#"{"type":"set-mode","mode":"turbo"}"#,
            r#"{"type":"fetch-task-log","taskId":-1}"#,
        ] {
            assert!(
                matches!(ClientCommand::parse(bad), Err(ProtocolError::Malformed(_))),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn autoscaler_message_flattens_state() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "default".to_string(),
            GroupSummary {
                status: "Running".to_string(),
                parallel: 3,
            },
        );
        let msg = ServerMessage::Autoscaler {
            state: AutoscalerState {
                mode: Mode::Auto,
                paused_tasks: vec![5],
                cpu_median: Some(42.5),
                last_action: None,
                config: AutoscaleConfig::default(),
            },
            groups: Some(groups),
        };

        let value: Value = serde_json::from_str(&msg.to_frame()).unwrap();
        assert_eq!(value["type"], "autoscaler");
        assert_eq!(value["mode"], "auto");
        assert_eq!(value["pausedTasks"], json!([5]));
        assert_eq!(value["cpuMedian"], 42.5);
        assert_eq!(value["queueGroups"]["default"]["parallel"], 3);
    }

    #[test]
    fn point_to_point_messages() {
        let log: Value = serde_json::from_str(
            &ServerMessage::TaskLog {
                task_id: 7,
                log: "done".to_string(),
            }
            .to_frame(),
        )
        .unwrap();
        assert_eq!(log, json!({"type": "task-log", "taskId": 7, "log": "done"}));

        let err: Value = serde_json::from_str(&ServerMessage::error("nope").to_frame()).unwrap();
        assert_eq!(err, json!({"type": "error", "message": "nope"}));

        assert_eq!(ServerMessage::CleanFinished { ok: true }.kind(), "clean-finished");
    }
}
