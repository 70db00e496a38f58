//! `nerdctl` + `ctr` implementation of the runtime boundary.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use fastpull_common::config::RuntimeConfig;
use fastpull_common::constants::DEFAULT_CHANNEL_CAPACITY;
use fastpull_common::error::{FastpullError, Result};
use fastpull_common::types::ContainerId;
use tokio::process::Child;
use tokio::sync::mpsc;

use super::{ContainerRuntime, EventStream, LaunchSpec, LaunchedContainer, LogStream};
use crate::events::parse_event_line;
use crate::logs::{LossyLines, spawn_line_reader};
use crate::process::{command, display_command, image_for_mode, run_args};

/// Runtime backed by the `nerdctl` CLI, with events from `ctr events`.
#[derive(Debug, Clone)]
pub struct NerdctlRuntime {
    config: RuntimeConfig,
    channel_capacity: usize,
}

impl NerdctlRuntime {
    /// Creates a runtime using the given invocation settings.
    #[must_use]
    pub const fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Overrides the capacity of the log and event channels.
    #[must_use]
    pub const fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Returns the invocation settings.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Starts `nerdctl logs -f` for a container and merges its output.
    fn follow_logs(&self, id: &ContainerId) -> Result<LogStream> {
        let args = vec!["logs".to_string(), "-f".to_string(), id.to_string()];
        let mut child = command(&self.config, &self.config.binary, &args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FastpullError::Io {
                path: self.config.binary.clone().into(),
                source: e,
            })?;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        if let Some(stdout) = child.stdout.take() {
            let _ = spawn_line_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            let _ = spawn_line_reader(stderr, tx.clone());
        }
        let _ = tokio::spawn(supervise(child, tx, "log follower"));
        Ok(rx)
    }
}

/// How long a follower gets to exit after SIGTERM before it is killed.
const FOLLOWER_STOP_GRACE: Duration = Duration::from_secs(2);

/// Keeps a follower process alive until it exits or its consumer goes away.
async fn supervise<T: Send + 'static>(mut child: Child, tx: mpsc::Sender<T>, what: &'static str) {
    tokio::select! {
        () = tx.closed() => {
            tracing::debug!(what, "consumer gone, stopping follower");
            stop_follower(&mut child, what).await;
        }
        status = child.wait() => {
            tracing::debug!(what, ?status, "follower exited");
        }
    }
}

/// Stops a follower with SIGTERM, then SIGKILL.
///
/// `sudo` relays SIGTERM to the command it runs but cannot relay SIGKILL,
/// so killing outright would leave the real `ctr`/`nerdctl` behind.
async fn stop_follower(child: &mut Child, what: &'static str) {
    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => {
                if let Ok(status) = tokio::time::timeout(FOLLOWER_STOP_GRACE, child.wait()).await {
                    tracing::debug!(what, ?status, "follower terminated");
                    return;
                }
                tracing::warn!(what, pid, "follower ignored SIGTERM, killing");
            }
            Err(e) => tracing::debug!(what, pid, error = %e, "SIGTERM failed"),
        }
    }
    tracing::debug!(what, "killing follower");
    let _ = child.kill().await;
}

#[async_trait]
impl ContainerRuntime for NerdctlRuntime {
    async fn subscribe_events(&self) -> Result<EventStream> {
        let args = vec![
            "--namespace".to_string(),
            self.config.namespace.clone(),
            "events".to_string(),
        ];
        tracing::info!(
            cmd = %display_command(&self.config, &self.config.events_binary, &args),
            "subscribing to runtime events"
        );
        let mut child = command(&self.config, &self.config.events_binary, &args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| FastpullError::EventStream {
                message: format!("cannot start {}: {e}", self.config.events_binary),
            })?;
        let stdout = child.stdout.take().ok_or_else(|| FastpullError::EventStream {
            message: "event feed has no stdout".into(),
        })?;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let reader_tx = tx.clone();
        let _ = tokio::spawn(async move {
            let mut lines = LossyLines::new(stdout);
            loop {
                tokio::select! {
                    () = reader_tx.closed() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let Some(event) = parse_event_line(&line) else {
                                continue;
                            };
                            if reader_tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            let _ = reader_tx
                                .send(Err(FastpullError::EventStream {
                                    message: e.to_string(),
                                }))
                                .await;
                            break;
                        }
                    },
                }
            }
        });
        let _ = tokio::spawn(supervise(child, tx, "event feed"));
        Ok(rx)
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedContainer> {
        let image = image_for_mode(&spec.image, spec.run_mode);
        let args = run_args(spec, true);
        tracing::info!(
            cmd = %display_command(&self.config, &self.config.binary, &args),
            "launching container"
        );

        let output = command(&self.config, &self.config.binary, &args)
            .output()
            .await
            .map_err(|e| FastpullError::Launch {
                image: image.clone(),
                message: format!("cannot run {}: {e}", self.config.binary),
            })?;

        if !output.status.success() {
            return Err(FastpullError::Launch {
                image,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(raw_id) = stdout.lines().map(str::trim).rfind(|l| !l.is_empty()) else {
            return Err(FastpullError::Launch {
                image,
                message: "runtime did not report a container id".into(),
            });
        };
        let id = ContainerId::new(raw_id);
        tracing::info!(id = %id.short(), image = %image, "container started");

        let logs = self.follow_logs(&id)?;
        Ok(LaunchedContainer { id, image, logs })
    }

    async fn wait(&self, id: &ContainerId) -> Result<i32> {
        let args = vec!["wait".to_string(), id.to_string()];
        let output = command(&self.config, &self.config.binary, &args)
            .output()
            .await
            .map_err(|e| FastpullError::Io {
                path: self.config.binary.clone().into(),
                source: e,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .lines()
            .last()
            .and_then(|l| l.trim().parse::<i32>().ok())
            .ok_or_else(|| FastpullError::Runtime {
                command: display_command(&self.config, &self.config.binary, &args),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
    }

    async fn run_attached(&self, spec: &LaunchSpec) -> Result<i32> {
        let args = run_args(spec, false);
        tracing::info!(
            cmd = %display_command(&self.config, &self.config.binary, &args),
            "running container attached"
        );
        let status = command(&self.config, &self.config.binary, &args)
            .stdin(Stdio::inherit())
            .status()
            .await
            .map_err(|e| FastpullError::Launch {
                image: image_for_mode(&spec.image, spec.run_mode),
                message: format!("cannot run {}: {e}", self.config.binary),
            })?;
        Ok(status.code().unwrap_or(-1))
    }

    fn is_available(&self) -> bool {
        which::which(&self.config.binary).is_ok() && which::which(&self.config.events_binary).is_ok()
    }
}
