//! System-wide constants and defaults.

/// Binary name for the CLI.
pub const BIN_NAME: &str = "fastpull";

/// Tag suffix carried by images converted for lazy loading.
pub const LAZY_TAG_SUFFIX: &str = "-fastpull";

/// Tag assumed when an image reference carries none.
pub const DEFAULT_TAG: &str = "latest";

/// Default container runtime CLI.
pub const DEFAULT_RUNTIME_BINARY: &str = "nerdctl";

/// Default containerd CLI used for the event feed.
pub const DEFAULT_EVENTS_BINARY: &str = "ctr";

/// Default containerd namespace.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default interval between readiness polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Default overall readiness budget, in seconds.
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 600;

/// Default per-request HTTP timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Default capacity of the log and event channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Width of the label column in the human-readable summary.
pub const SUMMARY_LABEL_WIDTH: usize = 36;

/// Width of the summary border.
pub const SUMMARY_WIDTH: usize = 60;
