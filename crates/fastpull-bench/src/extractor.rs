//! Log phase extraction.
//!
//! Lines are consumed one at a time as they arrive. Every rule that has not
//! matched yet is evaluated in table order; each matching rule is recorded
//! once and then retired, so duplicate lines never produce a second match.

use fastpull_runtime::backend::LogStream;
use tokio::sync::watch;

use crate::milestone::{FIRST_LOG, MilestoneStore};
use crate::phase::PhaseTable;

/// Stateful matcher over a workload's rule table.
#[derive(Debug, Clone)]
pub struct PhaseExtractor {
    table: PhaseTable,
    satisfied: Vec<bool>,
    first_log_seen: bool,
}

impl PhaseExtractor {
    /// Creates an extractor with every rule unsatisfied.
    #[must_use]
    pub fn new(table: PhaseTable) -> Self {
        let satisfied = vec![false; table.rules.len()];
        Self {
            table,
            satisfied,
            first_log_seen: false,
        }
    }

    /// Feeds one line and returns the milestones it newly satisfies.
    ///
    /// The first line ever observed yields `first_log` ahead of any phase.
    pub fn observe(&mut self, line: &str) -> Vec<&str> {
        let mut hits = Vec::new();
        if !self.first_log_seen {
            self.first_log_seen = true;
            hits.push(FIRST_LOG);
        }
        let lower = line.to_lowercase();
        for (rule, done) in self.table.rules.iter().zip(self.satisfied.iter_mut()) {
            if !*done && rule.matcher.matches(&lower) {
                *done = true;
                hits.push(rule.name.as_str());
            }
        }
        hits
    }

    /// Whether every rule has matched.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.first_log_seen && self.satisfied.iter().all(|done| *done)
    }
}

/// Consumes the log stream until it ends or cancellation is requested.
///
/// Returns the number of lines observed.
pub async fn run_log_extractor(
    mut logs: LogStream,
    mut extractor: PhaseExtractor,
    store: MilestoneStore,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut lines = 0_u64;
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            line = logs.recv() => {
                let Some(line) = line else {
                    tracing::debug!(lines, "log stream ended");
                    break;
                };
                lines += 1;
                let offset = store.clock().elapsed();
                tracing::debug!(elapsed = offset.as_secs_f64(), line = %line, "container log");
                for phase in extractor.observe(&line) {
                    if store.record_at(phase, offset) {
                        tracing::info!(
                            phase,
                            elapsed = format_args!("{:.3}s", offset.as_secs_f64()),
                            "phase detected"
                        );
                    }
                }
            }
        }
    }
    lines
}
