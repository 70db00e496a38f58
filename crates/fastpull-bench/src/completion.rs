//! Completion waiter.
//!
//! The run ends on whichever reports the exit first: `runtime.wait` or the
//! lifecycle watcher's `Exited` event. A container started with `--rm` can
//! be gone before `wait` attaches, so a failed wait falls back to the event.

use std::time::Duration;

use fastpull_common::error::{FastpullError, Result};
use fastpull_common::types::ContainerId;
use fastpull_runtime::backend::ContainerRuntime;
use tokio::sync::watch;

use crate::clock::RunClock;
use crate::milestone::LifecycleEvent;

/// How long a failed `wait` defers to a pending exit event.
pub const EXIT_EVENT_GRACE: Duration = Duration::from_secs(2);

/// Exit observed by the completion waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionResult {
    /// Offset at which the exit was observed.
    pub at: Duration,
    /// Exit status of the container process.
    pub exit_code: i32,
}

impl CompletionResult {
    fn from_event(event: LifecycleEvent) -> Self {
        Self {
            at: event.offset,
            exit_code: event.exit_code.unwrap_or_default(),
        }
    }
}

/// Blocks until the container exits.
///
/// `exits` carries the watcher's first `Exited` event. With no `timeout`
/// this waits indefinitely.
///
/// # Errors
///
/// Returns `FastpullError::Timeout` if `timeout` elapses first, or whatever
/// the runtime reports if it cannot wait on the container and no exit event
/// arrives within [`EXIT_EVENT_GRACE`].
pub async fn wait_for_completion(
    runtime: &dyn ContainerRuntime,
    id: &ContainerId,
    exits: watch::Receiver<Option<LifecycleEvent>>,
    timeout: Option<Duration>,
    clock: &RunClock,
) -> Result<CompletionResult> {
    tracing::info!(id = %id.short(), "waiting for container exit");
    let observed = observe_exit(runtime, id, exits, clock);
    let result = match timeout {
        Some(after) => tokio::time::timeout(after, observed)
            .await
            .map_err(|_| FastpullError::Timeout {
                operation: "completion",
                after,
            })??,
        None => observed.await?,
    };
    tracing::info!(
        id = %id.short(),
        exit_code = result.exit_code,
        elapsed = format_args!("{:.3}s", result.at.as_secs_f64()),
        "container exited"
    );
    Ok(result)
}

async fn observe_exit(
    runtime: &dyn ContainerRuntime,
    id: &ContainerId,
    mut exits: watch::Receiver<Option<LifecycleEvent>>,
    clock: &RunClock,
) -> Result<CompletionResult> {
    let waited = tokio::select! {
        biased;
        status = runtime.wait(id) => status,
        Some(event) = next_exit(&mut exits) => {
            tracing::debug!(id = %id.short(), "exit event arrived before wait returned");
            return Ok(CompletionResult::from_event(event));
        }
    };
    match waited {
        Ok(exit_code) => Ok(CompletionResult {
            at: clock.elapsed(),
            exit_code,
        }),
        Err(e) => {
            tracing::debug!(id = %id.short(), error = %e, "wait failed, checking for exit event");
            match tokio::time::timeout(EXIT_EVENT_GRACE, next_exit(&mut exits)).await {
                Ok(Some(event)) => Ok(CompletionResult::from_event(event)),
                _ => Err(e),
            }
        }
    }
}

async fn next_exit(exits: &mut watch::Receiver<Option<LifecycleEvent>>) -> Option<LifecycleEvent> {
    exits.wait_for(Option::is_some).await.ok().and_then(|slot| *slot)
}
