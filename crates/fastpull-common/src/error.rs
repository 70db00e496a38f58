//! Unified error types for the fastpull workspace.
//!
//! Fatal benchmark failures (launch, event stream, completion timeout) are
//! variants here. Non-fatal outcomes such as a readiness timeout or a phase
//! that never appeared are encoded in the report and never surface as errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum FastpullError {
    /// The container failed to start.
    #[error("failed to launch {image}: {message}")]
    Launch {
        /// Image reference that was being launched.
        image: String,
        /// Diagnostic from the runtime invocation.
        message: String,
    },

    /// The lifecycle event subscription failed or disconnected before the
    /// container start was observed.
    #[error("event stream failed: {message}")]
    EventStream {
        /// Description of the failure.
        message: String,
    },

    /// A caller-configured timeout elapsed.
    #[error("{operation} timed out after {:.3}s", after.as_secs_f64())]
    Timeout {
        /// Operation that was being waited on.
        operation: &'static str,
        /// Configured timeout that elapsed.
        after: Duration,
    },

    /// A runtime CLI invocation failed outside of launch.
    #[error("{command} failed: {message}")]
    Runtime {
        /// Runtime command that failed.
        command: String,
        /// Diagnostic from the invocation.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path (or program name) where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl FastpullError {
    /// Returns the harness stage this error belongs to.
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Launch { .. } => "launch",
            Self::EventStream { .. } => "events",
            Self::Timeout { .. } => "completion",
            Self::Runtime { .. } => "runtime",
            Self::Io { .. } => "io",
            Self::Config { .. } => "config",
            Self::Serialization { .. } => "serialization",
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FastpullError>;
