//! Terminal output helpers shared by CLI commands.

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const RED: &str = "\x1b[31m";
pub const RESET: &str = "\x1b[0m";

/// Prints the banner shown before a run.
pub fn print_header(subtitle: &str) {
    eprintln!();
    eprintln!(
        "  {BOLD}fastpull{RESET} {DIM}v{}{RESET}  {subtitle}",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
}

/// Maps a container exit status onto a process exit code.
///
/// Statuses outside `0..=255` (signals, unknown) become 1.
#[must_use]
pub fn exit_status(status: i32) -> u8 {
    u8::try_from(status).unwrap_or(1)
}
