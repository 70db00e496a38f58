//! Benchmark report assembly and rendering.
//!
//! A [`BenchmarkReport`] is built once from the sealed milestone snapshot and
//! never changes afterwards. The text summary and the JSON record are both
//! views over it.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use fastpull_common::constants::{SUMMARY_LABEL_WIDTH, SUMMARY_WIDTH};
use fastpull_common::error::{FastpullError, Result};
use fastpull_common::types::{BenchmarkMode, ContainerId, LifecycleEventKind, RunMode};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::completion::CompletionResult;
use crate::milestone::{COMPLETED, FIRST_LOG, LAUNCH, LifecycleEvent, READY, Snapshot};
use crate::phase::PhaseTable;
use crate::readiness::ReadinessResult;

/// What was benchmarked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    /// Image reference that was launched.
    pub image: String,
    /// Lazy or baseline pull.
    pub run_mode: RunMode,
    /// Terminal condition of the run.
    pub benchmark_mode: BenchmarkMode,
    /// Workload whose rule table was applied.
    pub workload: String,
    /// Runtime-assigned container identifier.
    pub container_id: ContainerId,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
}

/// A named instant, absent when never observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Milestone {
    /// Milestone name.
    pub name: String,
    /// Offset from the run start.
    pub offset: Option<Duration>,
}

/// A derived duration between two milestones.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    /// Interval name.
    pub name: String,
    /// Start milestone.
    pub start: String,
    /// End milestone.
    pub end: String,
    /// `end - start` in seconds; `None` unless both endpoints were observed.
    pub seconds: Option<f64>,
}

/// Readiness outcome as reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessSummary {
    /// Requests issued.
    pub attempts: u32,
    /// Whether the budget ran out before a 200.
    pub timed_out: bool,
}

/// Final, immutable result of one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    run: RunInfo,
    milestones: Vec<Milestone>,
    intervals: Vec<Interval>,
    readiness: Option<ReadinessSummary>,
    exit_code: Option<i32>,
    events: Vec<LifecycleEvent>,
    total_elapsed: Duration,
}

impl BenchmarkReport {
    /// Builds the report from everything collected during a run.
    ///
    /// Observed milestones are ordered chronologically; milestones that were
    /// expected but never observed follow in table order.
    #[must_use]
    pub fn assemble(
        run: RunInfo,
        table: &PhaseTable,
        snapshot: Snapshot,
        readiness: Option<ReadinessResult>,
        completion: Option<CompletionResult>,
        total_elapsed: Duration,
    ) -> Self {
        let expected = expected_milestones(table, run.benchmark_mode);
        let rank = |name: &str| {
            expected
                .iter()
                .position(|e| *e == name)
                .unwrap_or(expected.len())
        };

        let mut observed: Vec<(&String, &Duration)> = snapshot.milestones.iter().collect();
        observed.sort_by(|(a_name, a_at), (b_name, b_at)| {
            a_at.cmp(b_at)
                .then_with(|| rank(a_name.as_str()).cmp(&rank(b_name.as_str())))
                .then_with(|| a_name.cmp(b_name))
        });
        let mut milestones: Vec<Milestone> = observed
            .into_iter()
            .map(|(name, at)| Milestone {
                name: name.clone(),
                offset: Some(*at),
            })
            .collect();
        milestones.extend(
            expected
                .iter()
                .filter(|name| !snapshot.milestones.contains_key(**name))
                .map(|name| Milestone {
                    name: (*name).to_string(),
                    offset: None,
                }),
        );

        let intervals = table
            .intervals
            .iter()
            .filter(|spec| spec.applies_to(run.benchmark_mode))
            .map(|spec| {
                let start = snapshot.milestones.get(&spec.start);
                let end = snapshot.milestones.get(&spec.end);
                Interval {
                    name: spec.name.clone(),
                    start: spec.start.clone(),
                    end: spec.end.clone(),
                    seconds: match (start, end) {
                        (Some(start), Some(end)) => Some(end.as_secs_f64() - start.as_secs_f64()),
                        _ => None,
                    },
                }
            })
            .collect();

        let exit_code = completion.map(|c| c.exit_code).or_else(|| {
            snapshot
                .events
                .iter()
                .find(|e| e.kind == LifecycleEventKind::Exited)
                .and_then(|e| e.exit_code)
        });

        Self {
            run,
            milestones,
            intervals,
            readiness: readiness.map(|r| ReadinessSummary {
                attempts: r.attempts,
                timed_out: r.timed_out(),
            }),
            exit_code,
            events: snapshot.events,
            total_elapsed,
        }
    }

    /// Run metadata.
    #[must_use]
    pub const fn run(&self) -> &RunInfo {
        &self.run
    }

    /// Milestones in report order.
    #[must_use]
    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    /// Breakdown intervals in display order.
    #[must_use]
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Offset of a named milestone, if it was observed.
    #[must_use]
    pub fn milestone(&self, name: &str) -> Option<Duration> {
        self.milestones
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.offset)
    }

    /// Seconds of a named interval, if both endpoints were observed.
    #[must_use]
    pub fn interval(&self, name: &str) -> Option<f64> {
        self.intervals
            .iter()
            .find(|i| i.name == name)
            .and_then(|i| i.seconds)
    }

    /// Readiness outcome for readiness-mode runs.
    #[must_use]
    pub const fn readiness(&self) -> Option<ReadinessSummary> {
        self.readiness
    }

    /// Whether the readiness budget ran out.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.readiness.is_some_and(|r| r.timed_out)
    }

    /// Container exit status, when an exit was observed.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Lifecycle events in arrival order.
    #[must_use]
    pub fn events(&self) -> &[LifecycleEvent] {
        &self.events
    }

    /// Wall time from launch to the terminal condition.
    #[must_use]
    pub const fn total_elapsed(&self) -> Duration {
        self.total_elapsed
    }

    /// Renders the bordered text summary.
    #[must_use]
    pub fn render_summary(&self) -> String {
        let heavy = "=".repeat(SUMMARY_WIDTH);
        let light = "-".repeat(SUMMARY_WIDTH);
        let mut out = String::new();

        let _ = writeln!(out, "{heavy}");
        let _ = writeln!(out, "{} BENCHMARK SUMMARY", self.run.run_mode.label());
        let _ = writeln!(out, "{heavy}");
        push_row(&mut out, "Image", &self.run.image);
        push_row(&mut out, "Workload", &self.run.workload);
        push_row(&mut out, "Benchmark Mode", &self.run.benchmark_mode.to_string());
        push_row(&mut out, "Container", self.run.container_id.short());

        let _ = writeln!(out, "{light}");
        let _ = writeln!(out, "MILESTONES");
        for milestone in &self.milestones {
            push_row(
                &mut out,
                &title_case(&milestone.name),
                &format_seconds(milestone.offset.map(|d| d.as_secs_f64())),
            );
        }

        let _ = writeln!(out, "{light}");
        let _ = writeln!(out, "BREAKDOWN");
        for interval in &self.intervals {
            push_row(&mut out, &title_case(&interval.name), &format_seconds(interval.seconds));
        }

        let _ = writeln!(out, "{light}");
        if let Some(readiness) = self.readiness {
            let status = if readiness.timed_out {
                format!("TIMED OUT after {} attempts", readiness.attempts)
            } else {
                format!("ready after {} attempts", readiness.attempts)
            };
            push_row(&mut out, "Readiness", &status);
        }
        if let Some(code) = self.exit_code {
            push_row(&mut out, "Exit Code", &code.to_string());
        }
        push_row(
            &mut out,
            "Total Elapsed",
            &format_seconds(Some(self.total_elapsed.as_secs_f64())),
        );
        let _ = writeln!(out, "{heavy}");
        out
    }

    /// Serializes the structured record.
    ///
    /// # Errors
    ///
    /// Returns `FastpullError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.record())?)
    }

    /// Writes the structured record to `path`.
    ///
    /// # Errors
    ///
    /// Returns `FastpullError::Io` if the file cannot be written.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| FastpullError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "benchmark report written");
        Ok(())
    }

    fn record(&self) -> Record<'_> {
        Record {
            run: RunRecord {
                image: &self.run.image,
                run_mode: self.run.run_mode.to_string(),
                benchmark_mode: self.run.benchmark_mode.to_string(),
                workload: &self.run.workload,
                container_id: self.run.container_id.as_str(),
                started_at: self
                    .run
                    .started_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            },
            milestones: SecondsMap(
                self.milestones
                    .iter()
                    .map(|m| (m.name.as_str(), m.offset.map(|d| round_ms(d.as_secs_f64()))))
                    .collect(),
            ),
            intervals: SecondsMap(
                self.intervals
                    .iter()
                    .map(|i| (i.name.as_str(), i.seconds.map(round_ms)))
                    .collect(),
            ),
            readiness: self.readiness,
            exit_code: self.exit_code,
            events: self
                .events
                .iter()
                .map(|e| EventRecord {
                    kind: e.kind.to_string(),
                    offset: round_ms(e.offset.as_secs_f64()),
                    exit_code: e.exit_code,
                })
                .collect(),
            total_elapsed: round_ms(self.total_elapsed.as_secs_f64()),
        }
    }
}

/// Milestones a run of `mode` is expected to produce, in table order.
fn expected_milestones(table: &PhaseTable, mode: BenchmarkMode) -> Vec<&str> {
    let mut names = vec![
        LAUNCH,
        LifecycleEventKind::Created.milestone(),
        LifecycleEventKind::Started.milestone(),
        FIRST_LOG,
    ];
    names.extend(table.phase_names());
    match mode {
        BenchmarkMode::Readiness => names.push(READY),
        BenchmarkMode::Completion => {
            names.push(COMPLETED);
            names.push(LifecycleEventKind::Exited.milestone());
        }
        BenchmarkMode::None => {}
    }
    names
}

fn push_row(out: &mut String, label: &str, value: &str) {
    let label = format!("{label}:");
    let _ = writeln!(out, "{label:<SUMMARY_LABEL_WIDTH$}{value}");
}

/// `weights_download_start` -> `Weights Download Start`.
fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_seconds(seconds: Option<f64>) -> String {
    seconds.map_or_else(|| "N/A (not observed)".to_string(), |s| format!("{s:.3}s"))
}

fn round_ms(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

#[derive(Serialize)]
struct Record<'a> {
    run: RunRecord<'a>,
    milestones: SecondsMap<'a>,
    intervals: SecondsMap<'a>,
    readiness: Option<ReadinessSummary>,
    exit_code: Option<i32>,
    events: Vec<EventRecord>,
    total_elapsed: f64,
}

#[derive(Serialize)]
struct RunRecord<'a> {
    image: &'a str,
    run_mode: String,
    benchmark_mode: String,
    workload: &'a str,
    container_id: &'a str,
    started_at: String,
}

#[derive(Serialize)]
struct EventRecord {
    kind: String,
    offset: f64,
    exit_code: Option<i32>,
}

/// Name-to-seconds map that keeps insertion order on the wire.
struct SecondsMap<'a>(Vec<(&'a str, Option<f64>)>);

impl Serialize for SecondsMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, seconds) in &self.0 {
            map.serialize_entry(name, seconds)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::phase::Workload;
    use crate::readiness::ReadinessOutcome;

    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn run_info(mode: BenchmarkMode) -> RunInfo {
        RunInfo {
            image: "docker.io/vllm/vllm-openai:v0.9.0-fastpull".into(),
            run_mode: RunMode::Lazy,
            benchmark_mode: mode,
            workload: "vllm".into(),
            container_id: ContainerId::new("3f2a9c1d7b4e5f60a1b2c3d4"),
            started_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .expect("timestamp")
                .with_timezone(&Utc),
        }
    }

    fn snapshot(entries: &[(&str, f64)]) -> Snapshot {
        Snapshot {
            milestones: entries
                .iter()
                .map(|(name, at)| ((*name).to_string(), secs(*at)))
                .collect::<HashMap<_, _>>(),
            events: Vec::new(),
        }
    }

    fn scenario_a() -> BenchmarkReport {
        let table = Workload::Vllm.table().expect("table");
        BenchmarkReport::assemble(
            run_info(BenchmarkMode::Readiness),
            &table,
            snapshot(&[
                ("launch", 0.0),
                ("container_start", 2.1),
                ("first_log", 15.2),
                ("weights_download_start", 67.9),
                ("weights_download_complete", 156.8),
                ("ready", 318.4),
            ]),
            Some(ReadinessResult {
                outcome: ReadinessOutcome::Ready { at: secs(318.4) },
                attempts: 160,
            }),
            None,
            secs(318.4),
        )
    }

    fn close(actual: Option<f64>, expected: f64) -> bool {
        actual.is_some_and(|a| (a - expected).abs() < 1e-6)
    }

    #[test]
    fn scenario_a_intervals() {
        let report = scenario_a();
        assert!(close(report.interval("container_to_first_log"), 13.1));
        assert!(close(report.interval("first_log_to_weights_start"), 52.7));
        assert!(close(report.interval("weights_download"), 88.9));
        assert!(close(report.interval("time_to_readiness"), 318.4));
        assert!(close(report.interval("time_to_container_start"), 2.1));
        assert!(!report.timed_out());
    }

    #[test]
    fn absent_endpoint_yields_absent_interval() {
        let report = scenario_a();
        assert_eq!(report.interval("weights_download_to_loaded"), None);
        assert_eq!(report.interval("weights_loaded_to_ready"), None);
        assert_eq!(report.milestone("weights_loaded"), None);
    }

    #[test]
    fn intervals_unreachable_in_mode_are_omitted() {
        let report = scenario_a();
        assert!(report.intervals().iter().all(|i| i.name != "time_to_completion"));
        assert!(report.milestones().iter().all(|m| m.name != "completed"));
    }

    #[test]
    fn milestones_are_chronological_then_absent_in_table_order() {
        let report = scenario_a();
        let names: Vec<&str> = report.milestones().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "launch",
                "container_start",
                "first_log",
                "weights_download_start",
                "weights_download_complete",
                "ready",
                "container_created",
                "engine_init",
                "weights_loaded",
                "graph_capture",
                "server_log_ready",
            ]
        );
    }

    #[test]
    fn out_of_order_phases_keep_arrival_order() {
        let table = Workload::Sglang.table().expect("table");
        let report = BenchmarkReport::assemble(
            run_info(BenchmarkMode::Readiness),
            &table,
            snapshot(&[("launch", 0.0), ("weights_loaded", 5.0), ("engine_init", 9.0)]),
            None,
            None,
            secs(10.0),
        );
        let first_three: Vec<&str> = report
            .milestones()
            .iter()
            .take(3)
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(first_three, vec!["launch", "weights_loaded", "engine_init"]);
    }

    #[test]
    fn summary_marks_absent_values() {
        let summary = scenario_a().render_summary();
        assert!(summary.starts_with(&"=".repeat(SUMMARY_WIDTH)));
        assert!(summary.contains("FASTPULL BENCHMARK SUMMARY"));
        assert!(summary.contains(&format!("{:<36}{}", "Container To First Log:", "13.100s")));
        assert!(summary.contains(&format!("{:<36}{}", "Weights Loaded:", "N/A (not observed)")));
        assert!(summary.contains("ready after 160 attempts"));
    }

    #[test]
    fn baseline_title() {
        let table = Workload::Generic.table().expect("table");
        let mut info = run_info(BenchmarkMode::Completion);
        info.run_mode = RunMode::Baseline;
        let report = BenchmarkReport::assemble(
            info,
            &table,
            snapshot(&[("launch", 0.0), ("completed", 4.0)]),
            None,
            Some(CompletionResult {
                at: secs(4.0),
                exit_code: 0,
            }),
            secs(4.0),
        );
        let summary = report.render_summary();
        assert!(summary.contains("NORMAL BENCHMARK SUMMARY"));
        assert!(summary.contains("Exit Code:"));
        assert_eq!(report.exit_code(), Some(0));
    }

    #[test]
    fn json_record_uses_null_for_absent() {
        let json = scenario_a().to_json().expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["milestones"]["weights_loaded"], serde_json::Value::Null);
        assert_eq!(value["intervals"]["weights_loaded_to_ready"], serde_json::Value::Null);
        assert_eq!(value["intervals"]["container_to_first_log"], 13.1);
        assert_eq!(value["readiness"]["timed_out"], false);
        assert_eq!(value["run"]["run_mode"], "lazy");
        assert_eq!(value["run"]["started_at"], "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn json_milestones_keep_report_order() {
        let json = scenario_a().to_json().expect("json");
        let launch = json.find("\"launch\"").expect("launch");
        let ready = json.find("\"ready\"").expect("ready");
        let created = json.find("\"container_created\"").expect("created");
        assert!(launch < ready);
        assert!(ready < created);
    }

    #[test]
    fn write_json_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        scenario_a().write_json(&path).expect("write");
        let content = std::fs::read_to_string(&path).expect("read");
        assert!(content.contains("\"time_to_readiness\""));
    }

    #[test]
    fn write_json_reports_io_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("report.json");
        let err = scenario_a().write_json(&path).expect_err("should fail");
        assert_eq!(err.stage(), "io");
    }

    #[test]
    fn title_case_words() {
        assert_eq!(title_case("time_to_container_start"), "Time To Container Start");
    }
}
