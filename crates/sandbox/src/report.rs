// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sandbox's outcome type, handed to the scheduler's Reporting step.

use joshua_core::ExitClass;

/// One run's captured outcome, before it becomes a `RunResult` (which
/// additionally carries the `RunToken` the scheduler generated).
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    pub exit_class: ExitClass,
    pub elapsed_seconds: u64,
    /// Combined stdout+stderr, capped at `joshua_core::OUTPUT_CAP` with
    /// `joshua_core::TRUNCATED_MARKER` appended if the cap was hit.
    pub output: Vec<u8>,
    /// Set when the run was killed for exceeding `Properties::timeout`
    /// rather than exiting on its own.
    pub timed_out: bool,
}

impl SandboxOutcome {
    /// Classify a process exit status: zero is `Pass`, anything else
    /// (including signal termination or a timeout kill) is `Fail`.
    pub fn from_exit_code(exit_code: Option<i32>, elapsed_seconds: u64, output: Vec<u8>, timed_out: bool) -> Self {
        let exit_class = match exit_code {
            Some(0) if !timed_out => ExitClass::Pass,
            _ => ExitClass::Fail,
        };
        Self {
            exit_class,
            elapsed_seconds,
            output,
            timed_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_is_pass() {
        let outcome = SandboxOutcome::from_exit_code(Some(0), 1, vec![], false);
        assert!(outcome.exit_class.is_pass());
    }

    #[test]
    fn nonzero_exit_is_fail() {
        let outcome = SandboxOutcome::from_exit_code(Some(1), 1, vec![], false);
        assert!(!outcome.exit_class.is_pass());
    }

    #[test]
    fn signal_kill_with_no_exit_code_is_fail() {
        let outcome = SandboxOutcome::from_exit_code(None, 1, vec![], false);
        assert!(!outcome.exit_class.is_pass());
    }

    #[test]
    fn timeout_is_fail_even_with_zero_exit_code() {
        let outcome = SandboxOutcome::from_exit_code(Some(0), 1, vec![], true);
        assert!(!outcome.exit_class.is_pass());
    }
}
