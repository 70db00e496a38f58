//! # fastpull-bench
//!
//! Container startup timing harness.
//!
//! A run launches one container and observes it from several concurrent
//! tasks that write into a shared insert-once [`MilestoneStore`]:
//!
//! - [`watch_lifecycle`](watcher::watch_lifecycle) records runtime-reported
//!   creation, start, and exit.
//! - [`run_log_extractor`](extractor::run_log_extractor) matches log lines
//!   against a workload's [`PhaseTable`].
//! - [`ReadinessPoller`](readiness::ReadinessPoller) or
//!   [`wait_for_completion`](completion::wait_for_completion) decides when
//!   the run ends.
//!
//! [`BenchmarkHarness`] wires them together and returns a
//! [`BenchmarkReport`].
//!
//! [`MilestoneStore`]: milestone::MilestoneStore
//! [`PhaseTable`]: phase::PhaseTable
//! [`BenchmarkHarness`]: harness::BenchmarkHarness
//! [`BenchmarkReport`]: report::BenchmarkReport
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod clock;
pub mod completion;
pub mod extractor;
pub mod harness;
pub mod milestone;
pub mod phase;
pub mod readiness;
pub mod report;
pub mod watcher;
