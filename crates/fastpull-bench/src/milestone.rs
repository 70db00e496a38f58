//! Insert-once milestone store shared by the observation tasks.
//!
//! Each milestone name is written at most once; the first writer wins.
//! Sealing the store at the terminal condition freezes it, so data that
//! arrives after cancellation was requested never reaches the report.
//!
//! The first `Exited` event is also published on a watch channel so the
//! completion waiter can end the run on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fastpull_common::types::LifecycleEventKind;
use tokio::sync::watch;

use crate::clock::RunClock;

/// Milestone recorded when the harness invokes the runtime launch.
pub const LAUNCH: &str = "launch";
/// Milestone recorded on the first container log line.
pub const FIRST_LOG: &str = "first_log";
/// Milestone recorded when the readiness endpoint answers.
pub const READY: &str = "ready";
/// Milestone recorded when the completion waiter observes the exit.
pub const COMPLETED: &str = "completed";

/// A lifecycle transition of the benchmarked container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Transition kind.
    pub kind: LifecycleEventKind,
    /// Offset from the run start.
    pub offset: Duration,
    /// Exit status for `Exited` events.
    pub exit_code: Option<i32>,
}

/// Immutable copy of everything recorded during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Milestone offsets by name.
    pub milestones: HashMap<String, Duration>,
    /// Lifecycle events in arrival order.
    pub events: Vec<LifecycleEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    milestones: HashMap<String, Duration>,
    events: Vec<LifecycleEvent>,
    sealed: bool,
}

/// Shared, cloneable handle to a run's milestones.
#[derive(Debug, Clone)]
pub struct MilestoneStore {
    clock: RunClock,
    inner: Arc<Mutex<Inner>>,
    exits: Arc<watch::Sender<Option<LifecycleEvent>>>,
}

impl MilestoneStore {
    /// Creates an empty store on the given timeline.
    #[must_use]
    pub fn new(clock: RunClock) -> Self {
        Self {
            clock,
            inner: Arc::new(Mutex::new(Inner::default())),
            exits: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Timeline this store records against.
    #[must_use]
    pub const fn clock(&self) -> &RunClock {
        &self.clock
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `name` at the current instant.
    ///
    /// Returns `false` if the milestone already exists or the store is sealed.
    pub fn record(&self, name: &str) -> bool {
        self.record_at(name, self.clock.elapsed())
    }

    /// Records `name` at an explicit offset.
    ///
    /// Returns `false` if the milestone already exists or the store is sealed.
    pub fn record_at(&self, name: &str, offset: Duration) -> bool {
        let mut inner = self.lock();
        if inner.sealed || inner.milestones.contains_key(name) {
            return false;
        }
        let _ = inner.milestones.insert(name.to_string(), offset);
        true
    }

    /// Appends a lifecycle event. Returns `false` once sealed.
    pub fn push_event(&self, event: LifecycleEvent) -> bool {
        let mut inner = self.lock();
        if inner.sealed {
            return false;
        }
        inner.events.push(event);
        if event.kind == LifecycleEventKind::Exited {
            let _ = self.exits.send_if_modified(|slot| {
                if slot.is_some() {
                    return false;
                }
                *slot = Some(event);
                true
            });
        }
        true
    }

    /// Receiver that holds the first `Exited` event once one is pushed.
    #[must_use]
    pub fn exits(&self) -> watch::Receiver<Option<LifecycleEvent>> {
        self.exits.subscribe()
    }

    /// Offset of a milestone, if recorded.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Duration> {
        self.lock().milestones.get(name).copied()
    }

    /// Whether the store has been sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    /// Freezes the store and returns its final contents.
    pub fn seal(&self) -> Snapshot {
        let mut inner = self.lock();
        inner.sealed = true;
        Snapshot {
            milestones: inner.milestones.clone(),
            events: inner.events.clone(),
        }
    }
}
