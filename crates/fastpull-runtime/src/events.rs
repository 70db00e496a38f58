//! Parsing of containerd event feed lines.
//!
//! `ctr events` prints one event per line:
//!
//! ```text
//! 2024-05-01 10:00:02.123456789 +0000 UTC default /tasks/start {"container_id":"3f2a…","pid":4242}
//! ```

use chrono::{DateTime, Utc};
use fastpull_common::types::LifecycleEventKind;
use serde_json::Value;

use crate::backend::RuntimeEvent;

/// Maps an event topic to the lifecycle transition it reports.
#[must_use]
pub fn topic_kind(topic: &str) -> Option<LifecycleEventKind> {
    match topic {
        "/containers/create" => Some(LifecycleEventKind::Created),
        "/tasks/start" => Some(LifecycleEventKind::Started),
        "/tasks/exit" => Some(LifecycleEventKind::Exited),
        _ => None,
    }
}

/// Parses one feed line into a lifecycle event.
///
/// Returns `None` for topics that are not lifecycle transitions, for lines
/// without a container identifier, and for exits of exec'd processes (whose
/// `id` differs from the container's).
#[must_use]
pub fn parse_event_line(line: &str) -> Option<RuntimeEvent> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let topic_idx = tokens.iter().position(|t| t.starts_with('/'))?;
    let kind = topic_kind(tokens[topic_idx])?;

    let topic_end = line.find(tokens[topic_idx])? + tokens[topic_idx].len();
    let payload: Value = serde_json::from_str(line[topic_end..].trim()).ok()?;

    let container_id = payload
        .get("container_id")
        .or_else(|| payload.get("id"))
        .and_then(Value::as_str)?
        .to_string();

    if kind == LifecycleEventKind::Exited {
        if let Some(process_id) = payload.get("id").and_then(Value::as_str) {
            if process_id != container_id {
                return None;
            }
        }
    }

    let exit_code = payload
        .get("exit_status")
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok());

    Some(RuntimeEvent {
        kind,
        container_id,
        timestamp: parse_timestamp(&tokens[..topic_idx]),
        exit_code: if kind == LifecycleEventKind::Exited {
            exit_code.or(Some(0))
        } else {
            None
        },
    })
}

/// Parses the leading `date time offset [zone]` tokens.
fn parse_timestamp(prefix: &[&str]) -> Option<DateTime<Utc>> {
    if prefix.len() < 3 {
        return None;
    }
    let text = format!("{} {} {}", prefix[0], prefix[1], prefix[2]);
    DateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f %z")
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
