// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! joshua-sandbox: materializes a package into a working directory and
//! runs it as a supervised subprocess.
//!
//! The agent process registers itself as a child subreaper on startup
//! ([`subreaper::register`]) so that a run's orphaned grandchildren are
//! reparented to it rather than to PID 1, and get reaped when the run's
//! process group is torn down.

pub mod process;
pub mod report;
pub mod subreaper;
pub mod workdir;

pub use process::{run, RunOptions};
pub use report::SandboxOutcome;
pub use subreaper::register as register_subreaper;
pub use workdir::{cleanup, materialize, WorkDir};
