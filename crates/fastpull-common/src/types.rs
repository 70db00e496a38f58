//! Domain primitive types used across the fastpull workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FastpullError;

/// Identifier of a container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the 12-character short form used in CLI output.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    /// Returns whether `other` names the same container.
    ///
    /// Runtimes print either the full 64-character ID or a unique prefix,
    /// so a prefix match in either direction counts.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        !other.is_empty() && (self.0.starts_with(other) || other.starts_with(&self.0))
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the image filesystem is materialised for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Lazy-loading snapshotter: file content is fetched on demand.
    Lazy,
    /// Traditional full pull through the overlay snapshotter.
    Baseline,
}

impl RunMode {
    /// Snapshotter name passed to the runtime.
    #[must_use]
    pub const fn snapshotter(self) -> &'static str {
        match self {
            Self::Lazy => "nydus",
            Self::Baseline => "overlayfs",
        }
    }

    /// Label used in report titles.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Lazy => "FASTPULL",
            Self::Baseline => "NORMAL",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lazy => write!(f, "lazy"),
            Self::Baseline => write!(f, "baseline"),
        }
    }
}

/// What signal ends a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkMode {
    /// No benchmarking; the container simply runs.
    None,
    /// The run ends when the container process exits.
    Completion,
    /// The run ends when an HTTP endpoint answers or the poll times out.
    Readiness,
}

impl fmt::Display for BenchmarkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Completion => write!(f, "completion"),
            Self::Readiness => write!(f, "readiness"),
        }
    }
}

impl FromStr for BenchmarkMode {
    type Err = FastpullError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "completion" => Ok(Self::Completion),
            "readiness" => Ok(Self::Readiness),
            other => Err(FastpullError::Config {
                message: format!("unknown benchmark mode: {other}"),
            }),
        }
    }
}

/// Kind of container lifecycle transition reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEventKind {
    /// The container object was created.
    Created,
    /// The container's task started.
    Started,
    /// The container's task exited.
    Exited,
}

impl LifecycleEventKind {
    /// Milestone name recorded for this transition.
    #[must_use]
    pub const fn milestone(self) -> &'static str {
        match self {
            Self::Created => "container_created",
            Self::Started => "container_start",
            Self::Exited => "container_exit",
        }
    }
}

impl fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// Generates a container name for runs that did not specify one.
#[must_use]
pub fn generate_container_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("fastpull-{}", &id[..8])
}
