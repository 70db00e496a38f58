//! Container runtime abstraction consumed by the benchmark harness.
//!
//! The harness never talks to a runtime directly. It consumes the three
//! operations of [`ContainerRuntime`]: subscribe to lifecycle events, launch
//! a container with a live log stream, and wait for a container to exit.

pub mod nerdctl;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fastpull_common::error::Result;
use fastpull_common::types::{ContainerId, LifecycleEventKind, RunMode};
use tokio::sync::mpsc;

/// Everything needed to start a container for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Image reference as given by the caller.
    pub image: String,
    /// Snapshotter selection.
    pub run_mode: RunMode,
    /// Container name.
    pub name: Option<String>,
    /// Port publications (`host:container`).
    pub publish: Vec<String>,
    /// Environment variables (`KEY=value`).
    pub env: Vec<String>,
    /// Volume mounts (`host:container`).
    pub volumes: Vec<String>,
    /// GPU device selection (e.g. `all`).
    pub gpus: Option<String>,
    /// Remove the container when it exits.
    pub remove: bool,
    /// Arguments appended after the image (the container command).
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Creates a spec with no extra flags.
    #[must_use]
    pub fn new(image: impl Into<String>, run_mode: RunMode) -> Self {
        Self {
            image: image.into(),
            run_mode,
            name: None,
            publish: Vec::new(),
            env: Vec::new(),
            volumes: Vec::new(),
            gpus: None,
            remove: false,
            args: Vec::new(),
        }
    }
}

/// A lifecycle transition as reported by the runtime's event feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    /// Transition kind.
    pub kind: LifecycleEventKind,
    /// Container the event refers to, as printed by the runtime.
    pub container_id: String,
    /// Runtime-reported instant, when the feed carries one.
    pub timestamp: Option<DateTime<Utc>>,
    /// Exit status for `Exited` events.
    pub exit_code: Option<i32>,
}

/// Unfiltered lifecycle events for every container in the namespace.
///
/// Dropping the receiver ends the subscription.
pub type EventStream = mpsc::Receiver<Result<RuntimeEvent>>;

/// Combined stdout/stderr lines of a container, in arrival order.
///
/// Dropping the receiver stops following the logs.
pub type LogStream = mpsc::Receiver<String>;

/// A container that reached the running state.
#[derive(Debug)]
pub struct LaunchedContainer {
    /// Identifier assigned by the runtime.
    pub id: ContainerId,
    /// Image reference that was actually launched.
    pub image: String,
    /// Live log stream.
    pub logs: LogStream,
}

/// Runtime operations the harness consumes.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Opens the lifecycle event feed.
    ///
    /// # Errors
    ///
    /// Returns `FastpullError::EventStream` if the feed cannot be opened.
    async fn subscribe_events(&self) -> Result<EventStream>;

    /// Starts a container and begins following its combined output.
    ///
    /// # Errors
    ///
    /// Returns `FastpullError::Launch` if the container does not reach the
    /// running state.
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedContainer>;

    /// Waits for the container to exit and returns its exit status.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot report the exit.
    async fn wait(&self, id: &ContainerId) -> Result<i32>;

    /// Runs a container in the foreground with inherited stdio.
    ///
    /// # Errors
    ///
    /// Returns `FastpullError::Launch` if the runtime cannot be invoked.
    async fn run_attached(&self, spec: &LaunchSpec) -> Result<i32>;

    /// Returns whether the runtime's tooling is installed on this host.
    fn is_available(&self) -> bool;
}
