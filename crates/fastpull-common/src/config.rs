//! Configuration models for the runtime boundary and the benchmark harness.
//!
//! Every field has a default, so a JSON config file only needs to name the
//! values it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{FastpullError, Result};

/// How the container runtime CLIs are invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime CLI used to launch, follow logs, and wait.
    pub binary: String,
    /// containerd CLI used for the event feed.
    pub events_binary: String,
    /// containerd namespace the events are read from.
    pub namespace: String,
    /// Whether commands are prefixed with `sudo`.
    pub sudo: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: constants::DEFAULT_RUNTIME_BINARY.into(),
            events_binary: constants::DEFAULT_EVENTS_BINARY.into(),
            namespace: constants::DEFAULT_NAMESPACE.into(),
            sudo: true,
        }
    }
}

/// Timing knobs for one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Interval between readiness polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Overall readiness budget, in seconds.
    pub readiness_timeout_secs: u64,
    /// Per-request HTTP timeout, in seconds.
    pub request_timeout_secs: u64,
    /// Optional bound on the completion wait, in seconds.
    pub completion_timeout_secs: Option<u64>,
    /// Capacity of the log and event channels.
    pub channel_capacity: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
            readiness_timeout_secs: constants::DEFAULT_READINESS_TIMEOUT_SECS,
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT_SECS,
            completion_timeout_secs: None,
            channel_capacity: constants::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl HarnessConfig {
    /// Interval between readiness polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Overall readiness budget.
    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Optional completion wait bound.
    #[must_use]
    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_secs.map(Duration::from_secs)
    }

    /// Rejects values that would make a run meaningless.
    ///
    /// # Errors
    ///
    /// Returns `FastpullError::Config` for a zero poll interval, readiness
    /// timeout, request timeout, or channel capacity.
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("poll_interval_ms", self.poll_interval_ms == 0),
            ("readiness_timeout_secs", self.readiness_timeout_secs == 0),
            ("request_timeout_secs", self.request_timeout_secs == 0),
            ("channel_capacity", self.channel_capacity == 0),
        ];
        if let Some((field, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(FastpullError::Config {
                message: format!("{field} must be greater than zero"),
            });
        }
        Ok(())
    }
}

/// Root configuration file model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastpullConfig {
    /// Runtime invocation settings.
    pub runtime: RuntimeConfig,
    /// Harness timing settings.
    pub harness: HarnessConfig,
}

impl FastpullConfig {
    /// Loads a configuration file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// carries invalid harness values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FastpullError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.harness.validate()?;
        Ok(config)
    }
}
