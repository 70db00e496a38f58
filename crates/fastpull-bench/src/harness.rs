//! Benchmark orchestration.
//!
//! Launches the container, runs the lifecycle watcher and the log phase
//! extractor as independent tasks, and drives the terminal condition
//! (readiness or completion) on the calling task. When the terminal
//! condition settles the milestone store is sealed before cancellation is
//! signalled, so the report contains exactly what was recorded up to that
//! point.

use std::sync::Arc;

use fastpull_common::config::HarnessConfig;
use fastpull_common::error::{FastpullError, Result};
use fastpull_common::types::{BenchmarkMode, ContainerId};
use fastpull_runtime::backend::{ContainerRuntime, LaunchSpec, LaunchedContainer};
use tokio::sync::watch;

use crate::clock::RunClock;
use crate::completion::{CompletionResult, wait_for_completion};
use crate::extractor::{PhaseExtractor, run_log_extractor};
use crate::milestone::{COMPLETED, LAUNCH, MilestoneStore, READY};
use crate::phase::PhaseTable;
use crate::readiness::{HttpProbe, ReadinessPoller, ReadinessResult, normalize_endpoint};
use crate::report::{BenchmarkReport, RunInfo};
use crate::watcher::watch_lifecycle;

/// One benchmark run to execute.
#[derive(Debug, Clone)]
pub struct BenchmarkRequest {
    /// Container to launch.
    pub launch: LaunchSpec,
    /// Terminal condition.
    pub benchmark_mode: BenchmarkMode,
    /// Endpoint polled in readiness mode.
    pub readiness_endpoint: Option<String>,
    /// Phase rules and breakdown for the workload.
    pub table: PhaseTable,
}

/// How the terminal condition settled.
#[derive(Debug, Clone, Copy)]
enum Terminal {
    Readiness(ReadinessResult),
    Completion(CompletionResult),
}

/// Runs benchmarks against a container runtime.
pub struct BenchmarkHarness {
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn HttpProbe>,
    config: HarnessConfig,
}

impl std::fmt::Debug for BenchmarkHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkHarness")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BenchmarkHarness {
    /// Creates a harness.
    #[must_use]
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn HttpProbe>,
        config: HarnessConfig,
    ) -> Self {
        Self {
            runtime,
            probe,
            config,
        }
    }

    /// Harness timing configuration.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Executes one benchmark run and assembles its report.
    ///
    /// A readiness timeout is not an error; it is reported in the returned
    /// report. Dropping the returned future cancels the observation tasks.
    ///
    /// # Errors
    ///
    /// - `FastpullError::Config` for mode `none`, a missing readiness
    ///   endpoint or invalid timing configuration.
    /// - `FastpullError::Launch` if the container does not start.
    /// - `FastpullError::EventStream` if the event feed fails before the
    ///   container start is observed.
    /// - `FastpullError::Timeout` if a configured completion timeout elapses.
    pub async fn run(&self, request: BenchmarkRequest) -> Result<BenchmarkReport> {
        self.config.validate()?;
        let endpoint = match request.benchmark_mode {
            BenchmarkMode::None => {
                return Err(FastpullError::Config {
                    message: "benchmark mode 'none' has no terminal condition to time".into(),
                });
            }
            BenchmarkMode::Readiness => {
                let endpoint = request.readiness_endpoint.as_deref().ok_or_else(|| {
                    FastpullError::Config {
                        message: "readiness mode requires a readiness endpoint".into(),
                    }
                })?;
                Some(normalize_endpoint(endpoint))
            }
            BenchmarkMode::Completion => None,
        };

        // Subscribe first so the start event cannot race the launch.
        let events = self.runtime.subscribe_events().await?;

        let clock = RunClock::start();
        let store = MilestoneStore::new(clock);
        let _ = store.record(LAUNCH);
        tracing::info!(
            image = %request.launch.image,
            mode = %request.launch.run_mode,
            benchmark = %request.benchmark_mode,
            workload = %request.table.workload,
            "launching container"
        );
        let LaunchedContainer { id, image, logs } = self.runtime.launch(&request.launch).await?;
        tracing::info!(id = %id.short(), image = %image, "container launched");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut watcher = tokio::spawn(watch_lifecycle(
            events,
            id.clone(),
            store.clone(),
            shutdown_rx.clone(),
        ));
        let extractor = tokio::spawn(run_log_extractor(
            logs,
            PhaseExtractor::new(request.table.clone()),
            store.clone(),
            shutdown_rx,
        ));

        let terminal = self.settle(endpoint, id.clone(), store.clone());
        tokio::pin!(terminal);
        let mut watcher_done = false;
        let outcome = loop {
            tokio::select! {
                result = &mut terminal => break result,
                joined = &mut watcher, if !watcher_done => {
                    watcher_done = true;
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => break Err(e),
                        Err(e) => {
                            break Err(FastpullError::EventStream {
                                message: format!("event watcher aborted: {e}"),
                            });
                        }
                    }
                }
            }
        };
        let total_elapsed = clock.elapsed();

        let snapshot = store.seal();
        let _ = shutdown_tx.send(true);
        if !watcher_done {
            match watcher.await {
                Ok(Err(e)) => tracing::debug!(error = %e, "event watcher ended with error after terminal"),
                Err(e) => tracing::warn!(error = %e, "event watcher task failed"),
                Ok(Ok(())) => {}
            }
        }
        match extractor.await {
            Ok(lines) => tracing::debug!(lines, "log extractor stopped"),
            Err(e) => tracing::warn!(error = %e, "log extractor task failed"),
        }

        let terminal = match outcome {
            Ok(terminal) => terminal,
            Err(e) => {
                tracing::error!(stage = e.stage(), error = %e, "benchmark failed");
                return Err(e);
            }
        };
        let (readiness, completion) = match terminal {
            Terminal::Readiness(result) => (Some(result), None),
            Terminal::Completion(result) => (None, Some(result)),
        };

        tracing::info!(
            elapsed = format_args!("{:.3}s", total_elapsed.as_secs_f64()),
            milestones = snapshot.milestones.len(),
            "benchmark finished"
        );
        let run = RunInfo {
            image,
            run_mode: request.launch.run_mode,
            benchmark_mode: request.benchmark_mode,
            workload: request.table.workload.clone(),
            container_id: id,
            started_at: clock.started_at(),
        };
        Ok(BenchmarkReport::assemble(
            run,
            &request.table,
            snapshot,
            readiness,
            completion,
            total_elapsed,
        ))
    }

    /// Waits for the terminal condition and records its milestone.
    async fn settle(
        &self,
        endpoint: Option<String>,
        id: ContainerId,
        store: MilestoneStore,
    ) -> Result<Terminal> {
        if let Some(url) = endpoint {
            let poller = ReadinessPoller::new(
                Arc::clone(&self.probe),
                url,
                self.config.poll_interval(),
                self.config.readiness_timeout(),
            )
            .with_request_timeout(self.config.request_timeout());
            let result = poller.poll(store.clock()).await;
            if let Some(at) = result.ready_at() {
                let _ = store.record_at(READY, at);
            }
            return Ok(Terminal::Readiness(result));
        }

        let result = wait_for_completion(
            self.runtime.as_ref(),
            &id,
            store.exits(),
            self.config.completion_timeout(),
            store.clock(),
        )
        .await?;
        let _ = store.record_at(COMPLETED, result.at);
        Ok(Terminal::Completion(result))
    }
}
