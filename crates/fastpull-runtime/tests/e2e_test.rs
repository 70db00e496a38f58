//! End-to-end tests for the `nerdctl` runtime against a scripted CLI.
//!
//! A shell script stands in for both `nerdctl` and `ctr`, answering the
//! subcommands the runtime issues:
//! 1. `run -d` prints a container id (or fails for a missing image)
//! 2. `logs -f` writes to stdout and stderr
//! 3. `wait` prints an exit status
//! 4. `events` prints noise, one lifecycle line, and stays open

#![cfg(unix)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use fastpull_common::config::RuntimeConfig;
use fastpull_common::error::FastpullError;
use fastpull_common::types::{LifecycleEventKind, RunMode};
use fastpull_runtime::backend::nerdctl::NerdctlRuntime;
use fastpull_runtime::backend::{ContainerRuntime, LaunchSpec};

const CONTAINER: &str = "3f2a9c1d7b4e5f60a1b2c3d4e5f60718";

const SCRIPT: &str = r#"#!/bin/sh
last=""
for arg in "$@"; do last="$arg"; done
case "$1" in
  --snapshotter)
    if [ "$last" = "no/such-image:latest-fastpull" ]; then
      echo "pull access denied for no/such-image" >&2
      exit 1
    fi
    echo "3f2a9c1d7b4e5f60a1b2c3d4e5f60718"
    ;;
  logs)
    echo "INFO server booting"
    echo "WARN no GPU found" >&2
    ;;
  wait)
    echo 3
    ;;
  --namespace)
    echo $$ > "$(dirname "$0")/events.pid"
    echo 'not an event line'
    printf 'bad \377\376 bytes\n'
    echo '2024-05-01 10:00:02.1 +0000 UTC default /tasks/start {"container_id":"3f2a9c1d7b4e5f60a1b2c3d4e5f60718","pid":42}'
    exec sleep 30
    ;;
esac
"#;

/// Writes the script once per test binary so no test executes a file
/// another test is still writing.
fn script() -> &'static PathBuf {
    static SCRIPT_PATH: OnceLock<(tempfile::TempDir, PathBuf)> = OnceLock::new();
    let (_, path) = SCRIPT_PATH.get_or_init(|| {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fake-nerdctl");
        std::fs::write(&path, SCRIPT).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        (dir, path)
    });
    path
}

fn runtime() -> NerdctlRuntime {
    let binary = script().display().to_string();
    NerdctlRuntime::new(RuntimeConfig {
        binary: binary.clone(),
        events_binary: binary,
        sudo: false,
        ..RuntimeConfig::default()
    })
    .with_channel_capacity(8)
}

// ── Launch ───────────────────────────────────────────────────────────

#[tokio::test]
async fn launch_reports_id_and_merges_output() {
    let spec = LaunchSpec::new("acme/vllm:v1", RunMode::Lazy);
    let mut launched = runtime().launch(&spec).await.expect("launch");

    assert_eq!(launched.id.as_str(), CONTAINER);
    assert_eq!(launched.image, "acme/vllm:v1-fastpull");

    let mut lines = HashSet::new();
    while let Some(line) = tokio::time::timeout(Duration::from_secs(10), launched.logs.recv())
        .await
        .expect("log stream stalled")
    {
        let _ = lines.insert(line);
    }
    assert!(lines.contains("INFO server booting"));
    assert!(lines.contains("WARN no GPU found"));
}

#[tokio::test]
async fn failed_launch_carries_runtime_stderr() {
    let spec = LaunchSpec::new("no/such-image", RunMode::Lazy);
    let err = runtime().launch(&spec).await.expect_err("launch must fail");
    match err {
        FastpullError::Launch { image, message } => {
            assert_eq!(image, "no/such-image:latest-fastpull");
            assert!(message.contains("pull access denied"));
        }
        other => panic!("expected launch error, got {other:?}"),
    }
}

// ── Wait ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn wait_returns_exit_status() {
    let runtime = runtime();
    let spec = LaunchSpec::new("busybox", RunMode::Baseline);
    let launched = runtime.launch(&spec).await.expect("launch");
    assert_eq!(runtime.wait(&launched.id).await.expect("wait"), 3);
}

// ── Events ───────────────────────────────────────────────────────────

#[tokio::test]
async fn event_feed_skips_noise_and_stops_follower_on_drop() {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let mut events = runtime().subscribe_events().await.expect("subscribe");
    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("event feed stalled")
        .expect("feed open")
        .expect("non-UTF-8 noise is skipped, not fatal");

    assert_eq!(event.kind, LifecycleEventKind::Started);
    assert_eq!(event.container_id, CONTAINER);
    assert!(event.timestamp.is_some());

    let pid_file = script().with_file_name("events.pid");
    let pid: i32 = std::fs::read_to_string(pid_file)
        .expect("pid file")
        .trim()
        .parse()
        .expect("pid");

    drop(events);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while kill(Pid::from_raw(pid), None).is_ok() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "event follower {pid} still running after the receiver was dropped"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
