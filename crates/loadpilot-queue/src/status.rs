//! Decoding of `pueue status --json` output.
//!
//! The status field of a task comes in several shapes depending on the
//! task state and the pueue version: a bare label (`"Queued"`), a single
//! key object (`{"Running": {"start": ..}}`), or a nested one
//! (`{"Paused": {"Running": {"start": ..}}}`). Older versions keep
//! `start`/`end` on the task itself. All of that is folded into
//! [`TaskStatus`] here so nothing above this module sees raw JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use loadpilot_state::{GroupSummary, QueueStatus, TaskId, TaskInfo, TaskResult, TaskStatus};

use crate::error::{QueueError, QueueResult};

#[derive(Deserialize)]
struct RawStatus {
    #[serde(default)]
    tasks: BTreeMap<String, RawTask>,
    #[serde(default)]
    groups: BTreeMap<String, RawGroup>,
}

#[derive(Deserialize)]
struct RawTask {
    id: TaskId,
    #[serde(default)]
    command: String,
    #[serde(default)]
    path: String,
    status: Value,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Deserialize)]
struct RawGroup {
    #[serde(default)]
    status: Value,
    #[serde(default = "default_parallel")]
    parallel_tasks: u32,
}

fn default_parallel() -> u32 {
    1
}

/// Decode the JSON printed by `pueue status --json`.
///
/// Tasks whose status label is not recognized are skipped. Tasks are
/// returned highest id first.
pub fn decode_status(raw: &str) -> QueueResult<QueueStatus> {
    let parsed: RawStatus =
        serde_json::from_str(raw).map_err(|e| QueueError::Decode(e.to_string()))?;

    let groups = parsed
        .groups
        .into_iter()
        .map(|(name, group)| {
            let summary = GroupSummary {
                status: label_of(&group.status).unwrap_or("Unknown").to_string(),
                parallel: group.parallel_tasks,
            };
            (name, summary)
        })
        .collect();

    let mut tasks: Vec<TaskInfo> = parsed
        .tasks
        .into_values()
        .filter_map(|task| {
            let fallback = (parse_time(task.start.as_deref()), parse_time(task.end.as_deref()));
            match decode_task_status(&task.status, fallback) {
                Some(status) => Some(TaskInfo {
                    id: task.id,
                    command: task.command,
                    path: task.path,
                    status,
                }),
                None => {
                    debug!(task_id = task.id, status = %task.status, "skipping task with unknown status");
                    None
                }
            }
        })
        .collect();

    tasks.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(QueueStatus { groups, tasks })
}

type Times = (Option<DateTime<FixedOffset>>, Option<DateTime<FixedOffset>>);

/// Fold one raw status value into the closed variant.
fn decode_task_status(value: &Value, (start, end): Times) -> Option<TaskStatus> {
    let (label, inner) = match value {
        Value::String(label) => (label.as_str(), &Value::Null),
        Value::Object(map) if map.len() == 1 => {
            let (label, inner) = map.iter().next()?;
            (label.as_str(), inner)
        }
        _ => return None,
    };

    let status = match label {
        "Queued" => TaskStatus::Queued,
        "Stashed" => TaskStatus::Stashed,
        "Locked" => TaskStatus::Locked,
        "Running" => TaskStatus::Running {
            start: time_field(inner, "start").or(start),
        },
        "Paused" => {
            let nested = inner.get("Running").unwrap_or(inner);
            TaskStatus::Paused {
                start: time_field(nested, "start").or(start),
            }
        }
        "Done" => {
            let result = inner.get("result").unwrap_or(inner);
            TaskStatus::Done {
                start: time_field(inner, "start").or(start),
                end: time_field(inner, "end").or(end),
                result: decode_result(result),
            }
        }
        _ => return None,
    };
    Some(status)
}

fn decode_result(value: &Value) -> TaskResult {
    match label_of(value) {
        Some("Success") => TaskResult::Success,
        Some("Failed") => {
            let code = value
                .get("Failed")
                .and_then(Value::as_i64)
                .unwrap_or(1);
            TaskResult::Failed(i32::try_from(code).unwrap_or(1))
        }
        Some("FailedToSpawn") => TaskResult::FailedToSpawn,
        Some("Killed") => TaskResult::Killed,
        Some("DependencyFailed") => TaskResult::DependencyFailed,
        _ => TaskResult::Errored,
    }
}

/// The label of a bare string or single-key object.
fn label_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.keys().next().map(String::as_str),
        _ => None,
    }
}

fn time_field(value: &Value, key: &str) -> Option<DateTime<FixedOffset>> {
    parse_time(value.get(key).and_then(Value::as_str))
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw?).ok()
}
