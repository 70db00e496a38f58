//! Workload phase rule tables.
//!
//! A table is an ordered list of [`PhaseRule`]s plus the breakdown
//! intervals derived from them. New workloads are supported by adding a
//! table, never by branching inside the extractor.

use std::fmt;

use fastpull_common::error::{FastpullError, Result};
use fastpull_common::types::BenchmarkMode;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::milestone::{COMPLETED, FIRST_LOG, LAUNCH, READY};

/// Predicate over one lower-cased log line.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Line contains the (lower-case) substring.
    Contains(String),
    /// Line matches the case-insensitive pattern.
    Pattern(Regex),
    /// Any of the inner matchers.
    AnyOf(Vec<Matcher>),
    /// All of the inner matchers.
    AllOf(Vec<Matcher>),
}

impl Matcher {
    /// Matches when any of the substrings occurs.
    #[must_use]
    pub fn any(needles: &[&str]) -> Self {
        Self::AnyOf(needles.iter().map(|n| Self::Contains(n.to_lowercase())).collect())
    }

    /// Matches when every substring occurs.
    #[must_use]
    pub fn all(needles: &[&str]) -> Self {
        Self::AllOf(needles.iter().map(|n| Self::Contains(n.to_lowercase())).collect())
    }

    /// Compiles a case-insensitive regular expression.
    ///
    /// # Errors
    ///
    /// Returns `FastpullError::Config` if the pattern does not compile.
    pub fn pattern(pattern: &str) -> Result<Self> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(Self::Pattern)
            .map_err(|e| FastpullError::Config {
                message: format!("invalid phase pattern {pattern:?}: {e}"),
            })
    }

    /// Evaluates the predicate against an already lower-cased line.
    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Self::Contains(needle) => line.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(line),
            Self::AnyOf(inner) => inner.iter().any(|m| m.matches(line)),
            Self::AllOf(inner) => inner.iter().all(|m| m.matches(line)),
        }
    }
}

/// One phase of workload startup and how to spot it in the logs.
#[derive(Debug, Clone)]
pub struct PhaseRule {
    /// Milestone name recorded on the first match.
    pub name: String,
    /// Line predicate.
    pub matcher: Matcher,
}

impl PhaseRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(name: impl Into<String>, matcher: Matcher) -> Self {
        Self {
            name: name.into(),
            matcher,
        }
    }
}

/// A named duration between two milestones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSpec {
    /// Interval name.
    pub name: String,
    /// Milestone the interval starts at.
    pub start: String,
    /// Milestone the interval ends at.
    pub end: String,
}

impl IntervalSpec {
    /// Creates an interval between two milestones.
    #[must_use]
    pub fn new(name: &str, start: &str, end: &str) -> Self {
        Self {
            name: name.into(),
            start: start.into(),
            end: end.into(),
        }
    }

    /// Whether this interval can be observed in a run of `mode`.
    #[must_use]
    pub fn applies_to(&self, mode: BenchmarkMode) -> bool {
        let unreachable = match mode {
            BenchmarkMode::Readiness => COMPLETED,
            BenchmarkMode::Completion => READY,
            BenchmarkMode::None => return false,
        };
        self.start != unreachable && self.end != unreachable
    }
}

/// Ordered phase rules and breakdown intervals for one workload.
#[derive(Debug, Clone)]
pub struct PhaseTable {
    /// Workload name shown in reports.
    pub workload: String,
    /// Rules in evaluation order.
    pub rules: Vec<PhaseRule>,
    /// Breakdown intervals in display order.
    pub intervals: Vec<IntervalSpec>,
}

impl PhaseTable {
    /// Creates a table with the standard launch/first-log/terminal intervals.
    #[must_use]
    pub fn new(workload: impl Into<String>, rules: Vec<PhaseRule>) -> Self {
        Self {
            workload: workload.into(),
            rules,
            intervals: Vec::new(),
        }
    }

    /// Replaces the breakdown intervals.
    #[must_use]
    pub fn with_intervals(mut self, intervals: Vec<IntervalSpec>) -> Self {
        self.intervals = intervals;
        self
    }

    /// Phase names in rule order.
    pub fn phase_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }
}

/// Built-in workload types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workload {
    /// vLLM OpenAI-compatible server.
    Vllm,
    /// `SGLang` server.
    Sglang,
    /// TensorRT-LLM server.
    Tensorrt,
    /// Any container; only the first log line is tracked.
    Generic,
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vllm => write!(f, "vllm"),
            Self::Sglang => write!(f, "sglang"),
            Self::Tensorrt => write!(f, "tensorrt"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

impl Workload {
    /// Builds the rule table for this workload.
    ///
    /// # Errors
    ///
    /// Returns `FastpullError::Config` if a built-in pattern fails to compile.
    pub fn table(self) -> Result<PhaseTable> {
        let (rules, weights) = match self {
            Self::Vllm => (vllm_rules(), true),
            Self::Sglang => (sglang_rules(), true),
            Self::Tensorrt => (tensorrt_rules()?, true),
            Self::Generic => (Vec::new(), false),
        };
        Ok(PhaseTable::new(self.to_string(), rules).with_intervals(standard_intervals(weights)))
    }
}

fn vllm_rules() -> Vec<PhaseRule> {
    vec![
        PhaseRule::new(
            "engine_init",
            Matcher::any(&[
                "initializing a v1 llm engine",
                "waiting for init message",
                "v1 llm engine",
            ]),
        ),
        PhaseRule::new(
            "weights_download_start",
            Matcher::any(&["starting to load model", "loading model from scratch"]),
        ),
        PhaseRule::new(
            "weights_download_complete",
            Matcher::any(&["time spent downloading weights", "downloading weights"]),
        ),
        PhaseRule::new(
            "weights_loaded",
            Matcher::any(&[
                "loading weights took",
                "loading safetensors checkpoint shards: 100%",
            ]),
        ),
        PhaseRule::new(
            "graph_capture",
            Matcher::any(&[
                "graph capturing finished",
                "capturing cuda graph shapes: 100%",
            ]),
        ),
        PhaseRule::new("server_log_ready", Matcher::any(&["started server process"])),
    ]
}

fn sglang_rules() -> Vec<PhaseRule> {
    vec![
        PhaseRule::new(
            "engine_init",
            Matcher::any(&[
                "starting sglang",
                "sglang server",
                "initializing sglang",
                "launch_server",
            ]),
        ),
        PhaseRule::new("weights_download_start", Matcher::any(&["load weight begin"])),
        PhaseRule::new(
            "weights_download_complete",
            Matcher::all(&["loading safetensors checkpoint shards:", "0%"]),
        ),
        PhaseRule::new("weights_loaded", Matcher::any(&["load weight end"])),
        PhaseRule::new(
            "kv_cache_allocated",
            Matcher::any(&["kv cache is allocated", "kv cache allocated"]),
        ),
        PhaseRule::new(
            "graph_capture_begin",
            Matcher::any(&["capture cuda graph begin", "capturing cuda graph"]),
        ),
        PhaseRule::new(
            "graph_capture",
            Matcher::any(&["capture cuda graph end", "cuda graph capture complete"]),
        ),
        PhaseRule::new(
            "server_log_ready",
            Matcher::any(&["starting server", "server starting", "uvicorn", "listening on"]),
        ),
    ]
}

fn tensorrt_rules() -> Result<Vec<PhaseRule>> {
    Ok(vec![
        PhaseRule::new(
            "engine_init",
            Matcher::any(&["pytorchconfig(", "tensorrt-llm version", "kv cache quantization"]),
        ),
        PhaseRule::new(
            "weights_download_start",
            Matcher::any(&["prefetching", "checkpoint files", "gb for model weights"]),
        ),
        PhaseRule::new(
            "weights_download_complete",
            Matcher::any(&["loading /workspace/huggingface"]),
        ),
        PhaseRule::new(
            "weights_loaded",
            Matcher::any(&["loading weights: 100%", "model init total"]),
        ),
        PhaseRule::new(
            "model_loaded",
            Matcher::AnyOf(vec![
                Matcher::any(&[
                    "autotuning process ends",
                    "autotuner cache size",
                    "max_seq_len=",
                    "max_num_requests=",
                ]),
                Matcher::pattern(r"allocated.*gib for max tokens")?,
            ]),
        ),
        PhaseRule::new(
            "server_log_ready",
            Matcher::any(&["started server process", "waiting for application startup"]),
        ),
    ])
}

/// Breakdown shared by every workload; the weights intervals only apply
/// to model-serving workloads.
fn standard_intervals(weights: bool) -> Vec<IntervalSpec> {
    let mut intervals = vec![
        IntervalSpec::new("time_to_container_start", LAUNCH, "container_start"),
        IntervalSpec::new("container_to_first_log", "container_start", FIRST_LOG),
    ];
    if weights {
        intervals.extend([
            IntervalSpec::new("first_log_to_weights_start", FIRST_LOG, "weights_download_start"),
            IntervalSpec::new(
                "weights_download",
                "weights_download_start",
                "weights_download_complete",
            ),
            IntervalSpec::new(
                "weights_download_to_loaded",
                "weights_download_complete",
                "weights_loaded",
            ),
            IntervalSpec::new("weights_loaded_to_ready", "weights_loaded", READY),
        ]);
    }
    intervals.extend([
        IntervalSpec::new("time_to_first_log", LAUNCH, FIRST_LOG),
        IntervalSpec::new("time_to_readiness", LAUNCH, READY),
        IntervalSpec::new("time_to_completion", LAUNCH, COMPLETED),
    ]);
    intervals
}
