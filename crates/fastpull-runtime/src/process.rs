//! Runtime CLI invocation: image naming and argument construction.

use std::process::Stdio;

use fastpull_common::config::RuntimeConfig;
use fastpull_common::constants::{DEFAULT_TAG, LAZY_TAG_SUFFIX};
use fastpull_common::types::RunMode;
use tokio::process::Command;

use crate::backend::LaunchSpec;

/// Returns the image reference to run for the given mode.
///
/// Lazy-loading images are published under the same repository with a
/// `-fastpull` tag suffix. Digest references are left untouched.
#[must_use]
pub fn image_for_mode(image: &str, mode: RunMode) -> String {
    if mode == RunMode::Baseline || image.contains('@') {
        return image.to_string();
    }
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let tag = &image[name_start + i + 1..];
            if tag.ends_with(LAZY_TAG_SUFFIX) {
                image.to_string()
            } else {
                format!("{image}{LAZY_TAG_SUFFIX}")
            }
        }
        None => format!("{image}:{DEFAULT_TAG}{LAZY_TAG_SUFFIX}"),
    }
}

/// Builds the `run` arguments (everything after the runtime binary).
#[must_use]
pub fn run_args(spec: &LaunchSpec, detach: bool) -> Vec<String> {
    let mut args = vec![
        "--snapshotter".to_string(),
        spec.run_mode.snapshotter().to_string(),
        "run".to_string(),
    ];
    if detach {
        args.push("-d".into());
    }
    if let Some(name) = &spec.name {
        args.extend(["--name".into(), name.clone()]);
    }
    if spec.remove {
        args.push("--rm".into());
    }
    for port in &spec.publish {
        args.extend(["-p".into(), port.clone()]);
    }
    for env in &spec.env {
        args.extend(["-e".into(), env.clone()]);
    }
    for volume in &spec.volumes {
        args.extend(["-v".into(), volume.clone()]);
    }
    if let Some(gpus) = &spec.gpus {
        args.extend(["--gpus".into(), gpus.clone()]);
    }
    args.push(image_for_mode(&spec.image, spec.run_mode));
    args.extend(spec.args.iter().cloned());
    args
}

/// Builds a command for `binary`, prefixed with `sudo` when configured.
///
/// Children are killed when their handle is dropped so that cancelled
/// observation tasks never leave followers behind.
#[must_use]
pub fn command(config: &RuntimeConfig, binary: &str, args: &[String]) -> Command {
    let mut cmd = if config.sudo {
        let mut cmd = Command::new("sudo");
        let _ = cmd.arg(binary);
        cmd
    } else {
        Command::new(binary)
    };
    let _ = cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
    cmd
}

/// Renders a command line for log output.
#[must_use]
pub fn display_command(config: &RuntimeConfig, binary: &str, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 2);
    if config.sudo {
        parts.push("sudo");
    }
    parts.push(binary);
    parts.extend(args.iter().map(String::as_str));
    parts.join(" ")
}
