//! `fastpull run` — Launch a container and benchmark its startup.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, ValueEnum};
use fastpull_bench::harness::{BenchmarkHarness, BenchmarkRequest};
use fastpull_bench::phase::Workload;
use fastpull_bench::readiness::ReqwestProbe;
use fastpull_common::config::FastpullConfig;
use fastpull_common::types::{BenchmarkMode, RunMode, generate_container_name};
use fastpull_runtime::backend::nerdctl::NerdctlRuntime;
use fastpull_runtime::backend::{ContainerRuntime, LaunchSpec};
use fastpull_runtime::process::image_for_mode;

use crate::output::{BOLD, DIM, GREEN, RESET, YELLOW, exit_status, print_header};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image reference (the `-fastpull` tag suffix is added in nydus mode).
    pub image: String,

    /// Workload whose log phases are tracked.
    #[arg(long, value_enum, default_value_t = WorkloadArg::Generic)]
    pub workload: WorkloadArg,

    /// Snapshotter to pull with.
    #[arg(long, value_enum, default_value_t = PullMode::Nydus)]
    pub mode: PullMode,

    /// Terminal condition of the benchmark.
    #[arg(long, value_enum, default_value_t = BenchmarkArg::None)]
    pub benchmark_mode: BenchmarkArg,

    /// HTTP endpoint polled in readiness mode (e.g. `localhost:8000/health`).
    #[arg(long, env = "FASTPULL_READINESS_ENDPOINT")]
    pub readiness_endpoint: Option<String>,

    /// Write the structured report to this path.
    #[arg(long, value_name = "PATH")]
    pub output_json: Option<PathBuf>,

    /// Container name (generated when omitted).
    #[arg(long)]
    pub name: Option<String>,

    /// Publish a port (`host:container`).
    #[arg(short = 'p', long = "publish", value_name = "PORTS")]
    pub publish: Vec<String>,

    /// Set an environment variable (`KEY=value`).
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Bind mount a volume (`host:container`).
    #[arg(short = 'v', long = "volume", value_name = "MOUNT")]
    pub volumes: Vec<String>,

    /// GPU devices to expose (e.g. `all`).
    #[arg(long)]
    pub gpus: Option<String>,

    /// Remove the container when it exits.
    #[arg(long)]
    pub rm: bool,

    /// JSON configuration file.
    #[arg(long, env = "FASTPULL_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Readiness poll interval in milliseconds.
    #[arg(long, env = "FASTPULL_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Readiness budget in seconds.
    #[arg(long, env = "FASTPULL_READINESS_TIMEOUT")]
    pub readiness_timeout: Option<u64>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "FASTPULL_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// Fail a completion run that has not exited after this many seconds.
    #[arg(long, env = "FASTPULL_COMPLETION_TIMEOUT")]
    pub completion_timeout: Option<u64>,

    /// containerd namespace to watch for events.
    #[arg(long, env = "FASTPULL_NAMESPACE")]
    pub namespace: Option<String>,

    /// Invoke the runtime without `sudo`.
    #[arg(long)]
    pub no_sudo: bool,

    /// Command and arguments passed to the container.
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Workloads with built-in phase tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkloadArg {
    /// vLLM OpenAI-compatible server.
    Vllm,
    /// `SGLang` server.
    Sglang,
    /// TensorRT-LLM server.
    Tensorrt,
    /// Any other container.
    Generic,
}

impl From<WorkloadArg> for Workload {
    fn from(arg: WorkloadArg) -> Self {
        match arg {
            WorkloadArg::Vllm => Self::Vllm,
            WorkloadArg::Sglang => Self::Sglang,
            WorkloadArg::Tensorrt => Self::Tensorrt,
            WorkloadArg::Generic => Self::Generic,
        }
    }
}

/// Pull strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PullMode {
    /// Lazy-loading through the nydus snapshotter.
    Nydus,
    /// Full pull through overlayfs.
    Normal,
}

impl From<PullMode> for RunMode {
    fn from(mode: PullMode) -> Self {
        match mode {
            PullMode::Nydus => Self::Lazy,
            PullMode::Normal => Self::Baseline,
        }
    }
}

/// What ends the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BenchmarkArg {
    /// No benchmark: run attached.
    None,
    /// Until the container exits.
    Completion,
    /// Until the readiness endpoint answers 200.
    Readiness,
}

impl From<BenchmarkArg> for BenchmarkMode {
    fn from(arg: BenchmarkArg) -> Self {
        match arg {
            BenchmarkArg::None => Self::None,
            BenchmarkArg::Completion => Self::Completion,
            BenchmarkArg::Readiness => Self::Readiness,
        }
    }
}

impl RunArgs {
    fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            name: Some(self.name.clone().unwrap_or_else(generate_container_name)),
            publish: self.publish.clone(),
            env: self.env.clone(),
            volumes: self.volumes.clone(),
            gpus: self.gpus.clone(),
            remove: self.rm,
            args: self.args.clone(),
            ..LaunchSpec::new(&self.image, self.mode.into())
        }
    }

    /// Loads the config file, if any, and applies flag overrides.
    fn resolve_config(&self) -> anyhow::Result<FastpullConfig> {
        let mut config = match &self.config {
            Some(path) => FastpullConfig::load(path)
                .with_context(|| format!("cannot load config {}", path.display()))?,
            None => FastpullConfig::default(),
        };
        let harness = &mut config.harness;
        if let Some(ms) = self.poll_interval_ms {
            harness.poll_interval_ms = ms;
        }
        if let Some(secs) = self.readiness_timeout {
            harness.readiness_timeout_secs = secs;
        }
        if let Some(secs) = self.request_timeout {
            harness.request_timeout_secs = secs;
        }
        if self.completion_timeout.is_some() {
            harness.completion_timeout_secs = self.completion_timeout;
        }
        if let Some(namespace) = &self.namespace {
            config.runtime.namespace.clone_from(namespace);
        }
        if self.no_sudo {
            config.runtime.sudo = false;
        }
        config.harness.validate()?;
        Ok(config)
    }
}

/// Executes the `run` command.
///
/// Returns the container's own status in mode `none`, success for a
/// finished benchmark (including a readiness timeout).
///
/// # Errors
///
/// Returns an error if configuration is invalid, the launch fails, or the
/// run is interrupted.
pub fn execute(args: RunArgs) -> anyhow::Result<ExitCode> {
    let config = args.resolve_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run(args, config))
}

async fn run(args: RunArgs, config: FastpullConfig) -> anyhow::Result<ExitCode> {
    let backend = NerdctlRuntime::new(config.runtime.clone())
        .with_channel_capacity(config.harness.channel_capacity);
    if !backend.is_available() {
        tracing::warn!(
            runtime = %config.runtime.binary,
            events = %config.runtime.events_binary,
            "runtime tooling not found on PATH"
        );
    }

    let spec = args.launch_spec();
    let run_mode = RunMode::from(args.mode);
    let benchmark_mode = BenchmarkMode::from(args.benchmark_mode);
    print_header(&format!(
        "{} ({})",
        image_for_mode(&spec.image, run_mode),
        run_mode.snapshotter()
    ));

    if benchmark_mode == BenchmarkMode::None {
        let status = backend.run_attached(&spec).await?;
        return Ok(ExitCode::from(exit_status(status)));
    }

    let probe = ReqwestProbe::new(config.harness.request_timeout())?;
    let harness = BenchmarkHarness::new(Arc::new(backend), Arc::new(probe), config.harness);
    let request = BenchmarkRequest {
        launch: spec,
        benchmark_mode,
        readiness_endpoint: args.readiness_endpoint.clone(),
        table: Workload::from(args.workload).table()?,
    };

    let report = tokio::select! {
        result = harness.run(request) => result.map_err(|e| {
            let stage = e.stage();
            anyhow::Error::new(e).context(format!("benchmark failed at {stage} stage"))
        })?,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("benchmark interrupted"),
    };

    print!("{}", report.render_summary());

    if report.timed_out() {
        eprintln!("  {YELLOW}Readiness endpoint never answered 200 within the budget.{RESET}");
    }
    if let Some(path) = &args.output_json {
        report.write_json(path)?;
        eprintln!("  {GREEN}Report written to{RESET} {BOLD}{}{RESET}", path.display());
    } else {
        eprintln!("  {DIM}Use --output-json <PATH> to save the structured report.{RESET}");
    }
    Ok(ExitCode::SUCCESS)
}
