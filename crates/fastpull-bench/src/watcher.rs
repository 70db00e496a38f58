//! Lifecycle event watcher.
//!
//! Records runtime-reported creation, start, and exit of one container. The
//! start instant comes from the runtime rather than the logs, which can lag
//! far behind while the image is still being pulled.

use fastpull_common::error::{FastpullError, Result};
use fastpull_common::types::{ContainerId, LifecycleEventKind};
use fastpull_runtime::backend::EventStream;
use tokio::sync::watch;

use crate::milestone::{LifecycleEvent, MilestoneStore};

/// Follows the event feed for `container` until cancelled.
///
/// # Errors
///
/// Returns `FastpullError::EventStream` if the feed errors or closes before
/// the container's start event arrives. After the start has been seen, a
/// feed failure only ends the watch.
pub async fn watch_lifecycle(
    mut events: EventStream,
    container: ContainerId,
    store: MilestoneStore,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut started = false;
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => return Ok(()),
            event = events.recv() => match event {
                Some(Ok(event)) => {
                    if !container.matches(&event.container_id) {
                        continue;
                    }
                    let offset = event
                        .timestamp
                        .map_or_else(|| store.clock().elapsed(), |ts| store.clock().offset_of(ts));
                    let milestone = event.kind.milestone();
                    if store.record_at(milestone, offset) {
                        tracing::info!(
                            id = %container.short(),
                            event = %event.kind,
                            elapsed = format_args!("{:.3}s", offset.as_secs_f64()),
                            "lifecycle event"
                        );
                    }
                    let _ = store.push_event(LifecycleEvent {
                        kind: event.kind,
                        offset,
                        exit_code: event.exit_code,
                    });
                    if event.kind == LifecycleEventKind::Started {
                        started = true;
                    }
                }
                Some(Err(e)) if !started => return Err(e),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "event stream failed after container start");
                    return Ok(());
                }
                None if !started => {
                    return Err(FastpullError::EventStream {
                        message: "event feed closed before container start".into(),
                    });
                }
                None => {
                    tracing::debug!("event feed closed");
                    return Ok(());
                }
            },
        }
    }
}
