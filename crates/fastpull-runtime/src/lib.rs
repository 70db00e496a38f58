//! Container runtime boundary for the fastpull benchmark harness.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod backend;
pub mod events;
pub mod logs;
pub mod process;
